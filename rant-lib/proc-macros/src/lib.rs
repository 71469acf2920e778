use proc_macro::TokenStream;
mod opcode;

/// Used on the OpCode enum.
///
/// An opcode is an id paired with arguments, and enums lend themselves naturally to this
/// use case. In the byte stream an opcode is stored as its one byte discriminant followed by
/// the little endian bytes of its operand, so nothing is wasted on enum padding.
/// The enum must be `#[repr(u8)]` and every variant needs an explicit discriminant, which lets
/// rustc reject duplicate codes for us.
///
/// This Macro generates the following:
/// * a `u8` const for each variant, named like the variant in upper case
/// * `Self::ALL_CODES`, every code in declaration order
/// * `Self::code(&self) -> u8`
/// * `Self::mnemonic(&self)` and `Self::mnemonic_of(u8)` for disassembly
/// * `Self::operand_size_of(u8) -> Option<usize>` and `Self::encoded_size(&self)`
/// * `Self::encode(&self, &mut Vec<u8>)`
/// * `Self::decode(&mut ByteCursor) -> Result<Self, DecodeError>`
/// * `Self::dispatch(self, &mut Machine) -> ExecResult`
///   Every Opcode will be executed at some point by the vm.
///   this function will call the associated function for an opcode. That fn must be called
///   `exec_<opcode in lowercase>(vm: &mut Machine, operand)`, the operand is left out for
///   variants without data. The symbol must be in scope where the enum is defined.
#[proc_macro_derive(OpCode)]
pub fn convert(tokens: TokenStream) -> TokenStream {
    opcode::opcode_impl(tokens)
}
