use proc_macro2 as pm2;

use crate::attributes::{DjangoField, DjangoMeta};

fn parse_attrs(attrs: &[syn::Attribute]) -> syn::Result<Vec<DjangoMeta>> {
    attrs
        .iter()
        .filter(|attr| attr.path.is_ident("django"))
        .map(|attr| attr.parse_args::<DjangoMeta>())
        .collect()
}

pub fn derive_resource(input: syn::DeriveInput) -> pm2::TokenStream {
    let syn::DeriveInput {
        ident,
        data,
        generics,
        attrs,
        ..
    } = input;

    let mut model_name = syn::LitStr::new(&ident.to_string(), ident.span());
    match parse_attrs(&attrs) {
        Ok(metas) => {
            for meta in metas {
                if let Some(name) = meta.model {
                    model_name = name;
                }
            }
        }
        Err(e) => return e.into_compile_error(),
    }

    let named = match data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(syn::FieldsNamed { named, .. }),
            ..
        }) => named,
        _ => {
            return syn::Error::new(
                ident.span(),
                "Resource can only be derived for structs with named fields.",
            )
            .to_compile_error();
        }
    };

    let mut fields = pm2::TokenStream::new();
    for field in named.iter() {
        let fieldid = match field.ident.as_ref() {
            Some(id) => id,
            None => continue,
        };
        let mut fieldname = syn::LitStr::new(&fieldid.to_string(), fieldid.span());
        let fieldtype = &field.ty;
        let mut kind = DjangoField::Scalar;
        let mut choices = None;

        let metas = match parse_attrs(&field.attrs) {
            Ok(metas) => metas,
            Err(e) => return e.into_compile_error(),
        };
        for meta in metas {
            if let Some(name) = meta.name {
                fieldname = name;
            }
            if meta.choices.is_some() {
                choices = meta.choices;
            }
            match meta.field {
                DjangoField::Scalar => {}
                other => kind = other,
            }
        }

        let base = match kind {
            DjangoField::Excluded => continue,
            DjangoField::Relation => quote::quote! {
                <#fieldtype as ::django_graphql_filter::model::Related>::related_field()
            },
            DjangoField::Scalar => quote::quote! {
                <#fieldtype as ::django_graphql_filter::model::ScalarField>::model_field()
            },
        };
        let value = match choices {
            Some(choices) => quote::quote! { #base.with_choices([#(#choices),*]) },
            None => base,
        };
        fields.extend(quote::quote! {
            .with_field(#fieldname, #value)
        });
    }

    let (generics, ty_generics, wc) = generics.split_for_impl();

    quote::quote! {
        const _: () = {
            #[automatically_derived]
            impl #generics ::django_graphql_filter::model::Resource for #ident #ty_generics #wc {
                fn model() -> ::django_graphql_filter::model::ModelMeta {
                    ::django_graphql_filter::model::ModelMeta::new(#model_name)
                        #fields
                }
            }

            #[automatically_derived]
            impl #generics ::django_graphql_filter::model::Related for #ident #ty_generics #wc {
                fn related_field() -> ::django_graphql_filter::model::ModelField {
                    ::django_graphql_filter::model::ModelField::foreign_key(
                        <Self as ::django_graphql_filter::model::Resource>::model()
                    )
                }
            }
        };
    }
}
