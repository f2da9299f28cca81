use proc_macro::{self, TokenStream};

use proc_macro2 as pm2;

mod attributes;
mod resource;

/// Derive the `Resource` trait, describing a struct as a filterable
/// model.
///
/// This is only implemented for structs with named fields. Every
/// field is described to the model unless annotated otherwise, and
/// its type must implement `ScalarField`. The type also gains an
/// implementation of `Related`, so it can be the target of a relation
/// in another resource. The annotations use the `django` attribute,
/// which has the following options:
///
/// - `#[django(model="Name")]` On the struct, name the model `Name`
///   rather than using the name of the struct.
///
/// - `#[django(rename="new_name")]` Describe the annotated member as
///   `new_name` instead of using its name in the source code.
///
/// - `#[django(exclude)]` Do not describe this field; it cannot be
///   filtered on.
///
/// - `#[django(relation)]` The type of this field is itself a
///   `Resource` (possibly wrapped in `Option`, `Vec` or `Box`), and
///   is described as a foreign key. Paths may traverse it with the
///   double underscore syntax that Django uses.
///
/// - `#[django(choices("low", "high"))]` The field only takes the
///   given values. Filters on it validate against them.
#[proc_macro_derive(Resource, attributes(django))]
pub fn resource(input: TokenStream) -> TokenStream {
    let derive: syn::DeriveInput = syn::parse_macro_input!(input);

    let res: pm2::TokenStream = resource::derive_resource(derive);

    res.into()
}
