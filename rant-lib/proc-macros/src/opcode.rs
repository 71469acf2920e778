use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Expr, Ident, ItemEnum, Type};

struct VariantInfo<'a> {
    name: &'a Ident,
    const_name: Ident,
    lower: String,
    operand: Option<&'a Type>,
    discriminant: &'a Expr,
}

pub fn opcode_impl(tokens: TokenStream) -> TokenStream {
    let input = parse_macro_input!(tokens as ItemEnum);
    let enum_name = &input.ident;
    let infos: Vec<_> = input.variants.iter().map(variant_info).collect();

    let (consts, all_codes, code_arms, mnemonic_arms, size_arms, encode_arms, decode_arms, dispatch_arms): (
        TokenStream2,
        Vec<TokenStream2>,
        TokenStream2,
        TokenStream2,
        TokenStream2,
        TokenStream2,
        TokenStream2,
        TokenStream2,
    ) = itertools::multiunzip(infos.iter().map(|info| {
        let VariantInfo {
            name,
            const_name,
            lower,
            operand,
            discriminant,
        } = info;
        let exec_fn = format_ident!("exec_{}", lower);
        let constant = quote! { pub const #const_name: u8 = #discriminant; };
        let all = quote! { Self::#const_name };
        let mnemonic = quote! { Self::#const_name => Some(#lower), };
        match operand {
            None => (
                constant,
                all,
                quote! { Self::#name => Self::#const_name, },
                mnemonic,
                quote! { Self::#const_name => Some(0), },
                quote! { Self::#name => {} },
                quote! { Self::#const_name => Ok(Self::#name), },
                quote! { Self::#name => #exec_fn(vm), },
            ),
            Some(ty) => (
                constant,
                all,
                quote! { Self::#name(_) => Self::#const_name, },
                mnemonic,
                quote! { Self::#const_name => Some(<#ty as Operand>::SIZE), },
                quote! { Self::#name(data) => Operand::write(data, out), },
                quote! { Self::#const_name => Ok(Self::#name(<#ty as Operand>::read(cursor)?)), },
                quote! { Self::#name(data) => #exec_fn(vm, data), },
            ),
        }
    }));

    quote! {
        impl #enum_name {
            #consts

            pub const ALL_CODES: &'static [u8] = &[#(#all_codes),*];

            pub fn code(&self) -> u8 {
                match self {
                    #code_arms
                }
            }

            pub fn mnemonic_of(code: u8) -> Option<&'static str> {
                match code {
                    #mnemonic_arms
                    _ => None,
                }
            }

            pub fn mnemonic(&self) -> &'static str {
                Self::mnemonic_of(self.code()).unwrap_or("???")
            }

            /// size of the operand that follows the code byte, None for unknown codes
            pub fn operand_size_of(code: u8) -> Option<usize> {
                match code {
                    #size_arms
                    _ => None,
                }
            }

            pub fn encoded_size(&self) -> usize {
                1 + Self::operand_size_of(self.code()).unwrap_or(0)
            }

            pub fn encode(&self, out: &mut Vec<u8>) {
                out.push(self.code());
                match self {
                    #encode_arms
                }
            }

            pub fn decode(cursor: &mut ByteCursor<'_>) -> std::result::Result<Self, DecodeError> {
                let code = cursor.read_u8()?;
                match code {
                    #decode_arms
                    unknown => Err(DecodeError::UnknownOpCode(unknown)),
                }
            }

            pub fn dispatch(self, vm: &mut Machine<'_>) -> ExecResult {
                match self {
                    #dispatch_arms
                }
            }
        }
    }
    .into()
}

fn variant_info(v: &syn::Variant) -> VariantInfo<'_> {
    let operand = match v.fields {
        syn::Fields::Unit => None,
        syn::Fields::Named(_) => panic!("Only variants with zero or one unnamed field allowed"),
        syn::Fields::Unnamed(ref fields) => {
            assert!(
                fields.unnamed.len() == 1,
                "Only variants with zero or one unnamed field allowed"
            );
            fields.unnamed.first().map(|f| &f.ty)
        }
    };
    let Some((_, discriminant)) = &v.discriminant else {
        panic!("Variant {} needs an explicit discriminant", v.ident);
    };
    let lower = v.ident.to_string().to_lowercase();
    VariantInfo {
        name: &v.ident,
        const_name: Ident::new(&lower.to_uppercase(), v.ident.span()),
        lower,
        operand,
        discriminant,
    }
}
