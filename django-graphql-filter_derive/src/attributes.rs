#[derive(Debug)]
pub enum DjangoItem {
    Rename(syn::LitStr),
    Model(syn::LitStr),
    Choices(Vec<syn::LitStr>),
    Relation,
    Ignored,
}

impl syn::parse::Parse for DjangoItem {
    fn parse(input: syn::parse::ParseStream<'_>) -> syn::Result<Self> {
        let attr: syn::Ident = input.parse()?;
        match attr.to_string().as_str() {
            "rename" => {
                // rename = "my_field"
                let _: syn::Token![=] = input.parse()?;
                Ok(DjangoItem::Rename(input.parse()?))
            }
            "model" => {
                let _: syn::Token![=] = input.parse()?;
                Ok(DjangoItem::Model(input.parse()?))
            }
            "choices" => {
                // choices("low", "high")
                let content;
                let _: syn::token::Paren = syn::parenthesized!(content in input);
                let punc =
                    syn::punctuated::Punctuated::<syn::LitStr, syn::Token![,]>::parse_terminated(
                        &content,
                    )?;
                Ok(DjangoItem::Choices(punc.into_iter().collect()))
            }
            "relation" => Ok(DjangoItem::Relation),
            "exclude" => Ok(DjangoItem::Ignored),
            _ => Err(syn::Error::new_spanned(
                attr,
                "unsupported django attribute",
            )),
        }
    }
}

/// How a member is described to the model.
#[derive(Debug)]
pub enum DjangoField {
    Scalar,
    Relation,
    Excluded,
}

#[derive(Debug)]
pub struct DjangoMeta {
    pub name: Option<syn::LitStr>,
    pub model: Option<syn::LitStr>,
    pub choices: Option<Vec<syn::LitStr>>,
    pub field: DjangoField,
}

impl syn::parse::Parse for DjangoMeta {
    fn parse(input: syn::parse::ParseStream<'_>) -> syn::Result<Self> {
        let punc =
            syn::punctuated::Punctuated::<DjangoItem, syn::Token![,]>::parse_terminated(input)?;
        let mut name = None;
        let mut model = None;
        let mut choices = None;
        let mut excluded = false;
        let mut relation = false;

        for item in punc {
            match item {
                DjangoItem::Rename(new_name) => name = Some(new_name),
                DjangoItem::Model(m) => model = Some(m),
                DjangoItem::Choices(c) => choices = Some(c),
                DjangoItem::Relation => relation = true,
                DjangoItem::Ignored => excluded = true,
            }
        }
        let field = if excluded {
            DjangoField::Excluded
        } else if relation {
            DjangoField::Relation
        } else {
            DjangoField::Scalar
        };

        Ok(Self {
            name,
            model,
            choices,
            field,
        })
    }
}
