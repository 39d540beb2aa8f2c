//! Procedural macros for model_sync
//!
//! This crate provides the `ColumnDeclarations` derive macro, which implements
//! `model_sync::HasColumnDeclarations` for a struct with named fields.
//!
//! ```ignore
//! #[derive(Default, ColumnDeclarations)]
//! #[model(table = "posts")]
//! struct Post {
//!     id: i32,
//!     #[column(sql = "string(128) NOT NULL")]
//!     title: String,
//!     #[column(index, foreign_key = "users.id", on_delete = "CASCADE")]
//!     author_id: i32,
//!     #[column(skip)]
//!     cached_author: Option<String>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, LitStr, PathArguments,
    Type,
};

/// Derive macro for `HasColumnDeclarations`
#[proc_macro_derive(ColumnDeclarations, attributes(model, column))]
pub fn derive_column_declarations(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Options given on a single field through `#[column(...)]`
#[derive(Default)]
struct ColumnOptions {
    sql: Option<String>,
    name: Option<String>,
    index: bool,
    foreign_key: Option<(String, String)>,
    on_delete: Option<String>,
    on_update: Option<String>,
    skip: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "ColumnDeclarations only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "ColumnDeclarations only supports structs",
            ))
        }
    };

    let table_name = match parse_table_name(input)? {
        Some(table) => quote! { #table.to_string() },
        None => quote! { ::model_sync::utils::naming::default_table_name(stringify!(#name)) },
    };

    let mut columns = Vec::new();
    let mut operations = Vec::new();
    let mut group = 0usize;

    for field in fields {
        let options = parse_column_options(field)?;
        if options.skip {
            continue;
        }

        let column = match (&options.name, &field.ident) {
            (Some(column), _) => column.clone(),
            (None, Some(ident)) => ident.to_string().trim_start_matches("r#").to_string(),
            (None, None) => continue,
        };

        let sql = match &options.sql {
            Some(sql) => sql.clone(),
            None => infer_type(&column, &field.ty).ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "cannot infer a column type, add #[column(sql = \"...\")]",
                )
            })?,
        };

        columns.push(quote! {
            columns.insert(#column.to_string(), ::model_sync::TypeSpec::from(#sql));
        });

        // Operations on one field share a group, like a declaration's operation entry
        if options.index {
            operations.push(quote! {
                ::model_sync::Operation::create_index(&table, #column).in_group(#group)
            });
        }

        if let Some((ref_table, ref_column)) = &options.foreign_key {
            let on_delete = optional_str(&options.on_delete);
            let on_update = optional_str(&options.on_update);
            operations.push(quote! {
                ::model_sync::Operation::add_foreign_key(&table, #column, #ref_table, #ref_column)
                    .with_rules(#on_delete, #on_update)
                    .in_group(#group)
            });
        }

        if options.index || options.foreign_key.is_some() {
            group += 1;
        }
    }

    let operations_body = if operations.is_empty() {
        quote! { ::std::vec::Vec::new() }
    } else {
        quote! {
            let table = ::model_sync::HasColumnDeclarations::table_name(self);
            ::std::vec![#(#operations),*]
        }
    };

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::model_sync::HasColumnDeclarations for #name #ty_generics #where_clause {
            fn table_name(&self) -> ::std::string::String {
                #table_name
            }

            fn column_types(&self) -> ::model_sync::ColumnTypes {
                let mut columns = ::model_sync::ColumnTypes::new();
                #(#columns)*
                columns
            }

            fn operations(&self) -> ::std::vec::Vec<::model_sync::Operation> {
                #operations_body
            }
        }
    })
}

fn optional_str(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(value) => quote! { ::std::option::Option::Some(#value) },
        None => quote! { ::std::option::Option::None },
    }
}

/// Read `#[model(table = "...")]`
fn parse_table_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table = None;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported model attribute, expected `table`"))
            }
        })?;
    }

    Ok(table)
}

/// Read every `#[column(...)]` on a field
fn parse_column_options(field: &Field) -> syn::Result<ColumnOptions> {
    let mut options = ColumnOptions::default();

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("column")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("sql") {
                let value: LitStr = meta.value()?.parse()?;
                options.sql = Some(value.value());
            } else if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                options.name = Some(value.value());
            } else if meta.path.is_ident("index") {
                options.index = true;
            } else if meta.path.is_ident("foreign_key") {
                let value: LitStr = meta.value()?.parse()?;
                let target = value.value();
                let (ref_table, ref_column) = target.rsplit_once('.').ok_or_else(|| {
                    syn::Error::new_spanned(&value, "expected `table.column`")
                })?;
                options.foreign_key = Some((ref_table.to_string(), ref_column.to_string()));
            } else if meta.path.is_ident("on_delete") {
                let value: LitStr = meta.value()?.parse()?;
                options.on_delete = Some(value.value());
            } else if meta.path.is_ident("on_update") {
                let value: LitStr = meta.value()?.parse()?;
                options.on_update = Some(value.value());
            } else if meta.path.is_ident("skip") {
                options.skip = true;
            } else {
                return Err(meta.error("unsupported column attribute"));
            }
            Ok(())
        })?;
    }

    if options.foreign_key.is_none() && (options.on_delete.is_some() || options.on_update.is_some())
    {
        return Err(syn::Error::new_spanned(
            field,
            "`on_delete` and `on_update` require `foreign_key`",
        ));
    }

    Ok(options)
}

/// Abstract column type for a Rust field type. An integer `id` becomes the primary key.
fn infer_type(column: &str, ty: &Type) -> Option<String> {
    let Type::Path(type_path) = ty else {
        return match ty {
            Type::Reference(reference) => infer_type(column, &reference.elem),
            _ => None,
        };
    };

    let segment = type_path.path.segments.last()?;
    let inner = first_type_argument(&segment.arguments);

    let abstract_type = match segment.ident.to_string().as_str() {
        "Option" | "Box" => return infer_type(column, inner?),
        "Vec" => match inner? {
            Type::Path(inner) if inner.path.is_ident("u8") => "binary",
            _ => return None,
        },
        "i8" | "i16" | "u8" | "u16" => "smallint",
        "i32" | "u32" if column == "id" => "pk",
        "i64" | "u64" | "isize" | "usize" if column == "id" => "bigpk",
        "i32" | "u32" => "integer",
        "i64" | "u64" | "isize" | "usize" => "bigint",
        "f32" => "float",
        "f64" => "double",
        "bool" => "boolean",
        "String" | "str" | "char" => "string",
        "Decimal" | "BigDecimal" => "decimal",
        "NaiveDate" => "date",
        "NaiveTime" => "time",
        "NaiveDateTime" | "DateTime" | "SystemTime" => "datetime",
        "Uuid" => "uuid",
        "Value" | "Json" => "json",
        _ => return None,
    };

    Some(abstract_type.to_string())
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    match arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}
