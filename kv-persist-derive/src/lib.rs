use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, Ident, PathArguments, Type, parse_macro_input,
};

#[derive(Default)]
struct FieldFlags {
    id: bool,
    version: bool,
    base: bool,
    skip: bool,
}

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "Entity requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Entity can only be derived for structs",
            ));
        }
    };

    // 结构体级别的 #[entity(getter(name = Type))]
    let mut getters: Vec<(Ident, Type)> = Vec::new();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("getter") {
                meta.parse_nested_meta(|getter| {
                    let name = getter
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| getter.error("expected a getter name"))?;
                    let ty: Type = getter.value()?.parse()?;
                    getters.push((name, ty));
                    Ok(())
                })
            } else {
                Err(meta.error("unsupported entity attribute, expected `getter(..)`"))
            }
        })?;
    }

    let mut id_field = None;
    let mut version_field = None;
    let mut base_field = None;
    let mut attribute_fields = Vec::new();

    for field in fields {
        let mut flags = FieldFlags::default();
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    flags.id = true;
                } else if meta.path.is_ident("version") {
                    flags.version = true;
                } else if meta.path.is_ident("base") {
                    flags.base = true;
                } else if meta.path.is_ident("skip") {
                    flags.skip = true;
                } else {
                    return Err(meta.error(
                        "unsupported entity attribute, expected `id`, `version`, `base` or `skip`",
                    ));
                }
                Ok(())
            })?;
        }

        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        if flags.id {
            id_field = Some(field_name);
        }
        if flags.version {
            version_field = Some(field_name);
        }
        if flags.base {
            let inner = option_inner(&field.ty).ok_or_else(|| {
                syn::Error::new_spanned(&field.ty, "base field must be an Option<T: Entity>")
            })?;
            base_field = Some((field_name, inner));
            continue;
        }
        if !flags.skip {
            attribute_fields.push((field_name, &field.ty));
        }
    }

    let Some(id_field) = id_field else {
        return Err(syn::Error::new_spanned(
            struct_name,
            "Entity requires one field marked #[entity(id)]",
        ));
    };

    let field_descriptors = attribute_fields.iter().map(|(field_name, field_type)| {
        let name_str = field_name.to_string();
        quote! {
            kv_persist::AttributeDescriptor::new(
                #name_str,
                <#field_type as kv_persist::AttributeValue>::VALUE_TYPE,
                <#field_type as kv_persist::AttributeValue>::IS_ARRAY,
            )
        }
    });
    let getter_descriptors = getters.iter().map(|(getter_name, getter_type)| {
        let name_str = getter_name.to_string();
        quote! {
            kv_persist::AttributeDescriptor::new(
                #name_str,
                <#getter_type as kv_persist::AttributeValue>::VALUE_TYPE,
                <#getter_type as kv_persist::AttributeValue>::IS_ARRAY,
            )
        }
    });

    let field_arms = attribute_fields.iter().map(|(field_name, _)| {
        let name_str = field_name.to_string();
        quote! {
            #name_str => Ok(kv_persist::AttributeValue::to_value(&self.#field_name)),
        }
    });
    let getter_arms = getters.iter().map(|(getter_name, _)| {
        let name_str = getter_name.to_string();
        quote! {
            #name_str => Ok(kv_persist::AttributeValue::to_value(&self.#getter_name())),
        }
    });

    // 向上委托给父类型
    let (field_delegate, getter_delegate, supertype) = match &base_field {
        Some((base_name, base_type)) => (
            quote! {
                if level > 0 {
                    return match &self.#base_name {
                        Some(base) => kv_persist::Entity::read_field(base, level - 1, name),
                        None => Ok(None),
                    };
                }
            },
            quote! {
                if level > 0 {
                    return match &self.#base_name {
                        Some(base) => kv_persist::Entity::call_getter(base, level - 1, name),
                        None => Ok(None),
                    };
                }
            },
            quote! { Some(<#base_type as kv_persist::Entity>::type_path) },
        ),
        None => {
            let no_supertype = quote! {
                if level > 0 {
                    return Err(kv_persist::AccessError::NoSupertype {
                        entity: <Self as kv_persist::Entity>::type_path(),
                        level,
                    });
                }
            };
            (no_supertype.clone(), no_supertype, quote! { None })
        }
    };

    let version_impl = match version_field {
        Some(version_name) => quote! {
            fn version(&self) -> Option<u64> {
                Some(self.#version_name as u64)
            }

            fn set_version(&mut self, version: u64) {
                self.#version_name = version as _;
            }
        },
        None => quote! {},
    };

    let expanded = quote! {
        impl kv_persist::Entity for #struct_name {
            fn type_path() -> &'static str {
                concat!(module_path!(), "::", stringify!(#struct_name))
            }

            fn identity(&self) -> String {
                ::std::string::ToString::to_string(&self.#id_field)
            }

            fn declared_attributes() -> Vec<kv_persist::AttributeDescriptor> {
                vec![#(#field_descriptors,)* #(#getter_descriptors,)*]
            }

            fn read_field(
                &self,
                level: usize,
                name: &str,
            ) -> Result<Option<kv_persist::Value>, kv_persist::AccessError> {
                #field_delegate
                match name {
                    #(#field_arms)*
                    _ => Err(kv_persist::AccessError::NoSuchField {
                        entity: <Self as kv_persist::Entity>::type_path(),
                        name: name.to_string(),
                    }),
                }
            }

            fn call_getter(
                &self,
                level: usize,
                name: &str,
            ) -> Result<Option<kv_persist::Value>, kv_persist::AccessError> {
                #getter_delegate
                match name {
                    #(#getter_arms)*
                    _ => Err(kv_persist::AccessError::NoSuchGetter {
                        entity: <Self as kv_persist::Entity>::type_path(),
                        name: name.to_string(),
                    }),
                }
            }

            #version_impl
        }

        kv_persist::inventory::submit! {
            kv_persist::EntityMeta {
                type_path: concat!(module_path!(), "::", stringify!(#struct_name)),
                attributes: <#struct_name as kv_persist::Entity>::declared_attributes,
                supertype: #supertype,
            }
        }
    };

    Ok(expanded)
}

// 取出 Option<T> 中的 T
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
