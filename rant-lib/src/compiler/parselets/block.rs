//! `{a|*2*b|*[num:1;3]*c}`
//!
//! Layout: `Block`, then per item the optional weight code followed by the item body and a
//! `BlockEnd`. Weight code is only ever entered through its address, it captures the weight
//! pattern and returns it.

use std::mem;

use ordered_float::OrderedFloat;

use crate::compiler::parselets::{Parselet, PatternParselet, Step, Terminator};
use crate::compiler::{compilation_error, CompileErrorKind, CompileResult, Compiler};
use crate::core::{BlockInfo, BlockItem, ItemWeight, SourcePos, TokenKind};
use crate::opcode::OpCode;

enum State {
    Start,
    ItemStart,
    /// the interpreted weight starting at the offset was compiled
    WeightDone(u32),
    ItemDone,
}

pub struct BlockParselet {
    pos: SourcePos,
    state: State,
    idx: i32,
    items: Vec<BlockItem>,
}

impl BlockParselet {
    pub fn new(pos: SourcePos) -> Self {
        BlockParselet {
            pos,
            state: State::Start,
            idx: 0,
            items: vec![],
        }
    }

    fn begin_item(&mut self, compiler: &mut Compiler, weight: ItemWeight) -> Step {
        self.items.push(BlockItem {
            offset: compiler.gen.position() as u32,
            weight,
        });
        self.state = State::ItemDone;
        Step::Push(Parselet::Pattern(PatternParselet::new(Terminator::BlockItem)))
    }

    pub fn resume(&mut self, compiler: &mut Compiler) -> CompileResult<Step> {
        loop {
            match mem::replace(&mut self.state, State::ItemStart) {
                State::Start => {
                    self.idx = compiler.gen.reserve_block();
                    compiler.gen.add_generic(OpCode::Block(self.idx));
                }
                State::ItemStart => {
                    if !compiler.reader.take(TokenKind::Asterisk) {
                        return Ok(self.begin_item(compiler, ItemWeight::None));
                    }
                    let pos = compiler.reader.position();
                    if let Some(text) = compiler.reader.constant_until(&[TokenKind::Asterisk]) {
                        let Ok(weight) = text.trim().parse::<f64>() else {
                            compilation_error!(compiler, pos, InvalidArgument {
                                what: "block weight".into(),
                                value: text
                            });
                        };
                        compiler.reader.read("'*'")?;
                        let weight = ItemWeight::Constant(OrderedFloat(weight));
                        return Ok(self.begin_item(compiler, weight));
                    }
                    let offset = compiler.gen.position() as u32;
                    compiler.gen.add_generic(OpCode::NewOutput);
                    self.state = State::WeightDone(offset);
                    return Ok(Step::Push(Parselet::Pattern(PatternParselet::new(
                        Terminator::Weight,
                    ))));
                }
                State::WeightDone(offset) => {
                    compiler.reader.read("'*'")?;
                    compiler.gen.add_generic(OpCode::ReturnOutput);
                    compiler.gen.add_generic(OpCode::Return);
                    return Ok(self.begin_item(compiler, ItemWeight::Interpreted { offset }));
                }
                State::ItemDone => {
                    compiler.gen.add_generic(OpCode::BlockEnd);
                    let terminator = compiler.reader.read("'|' or '}'")?;
                    if terminator.kind == TokenKind::RightCurly {
                        let info = BlockInfo {
                            end_address: compiler.gen.position() as u32,
                            items: mem::take(&mut self.items),
                        };
                        log::trace!("block {} at {:?}: {:?}", self.idx, self.pos, info);
                        compiler.gen.set_block(self.idx, info);
                        return Ok(Step::Done);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    #[test]
    fn items_and_end_address() {
        let program = compile("test", "{a|b}c", false).unwrap();
        // Block 5, a 5, BlockEnd 1, b 5, BlockEnd 1
        assert_eq!(
            program.blocks,
            vec![BlockInfo {
                end_address: 17,
                items: vec![
                    BlockItem {
                        offset: 5,
                        weight: ItemWeight::None
                    },
                    BlockItem {
                        offset: 11,
                        weight: ItemWeight::None
                    }
                ]
            }]
        );
        assert_eq!(program.strings, vec!["a", "b", "c"]);
    }

    #[test]
    fn weights() {
        let program = compile("test", "{*2*a|*[add:1;2]*b}", false).unwrap();
        let items = &program.blocks[0].items;
        assert_eq!(items[0].weight, ItemWeight::Constant(OrderedFloat(2.0)));
        // Block 5, a 5, BlockEnd 1, then the weight code
        assert_eq!(items[1].weight, ItemWeight::Interpreted { offset: 11 });
        // NewOutput 1, PrintNumber 9, ReturnOutput 1, Return 1
        assert_eq!(items[1].offset, 23);
    }

    #[test]
    fn bad_weight() {
        let err = compile("test", "{*heavy*a}", false).unwrap_err();
        assert_eq!(
            err.kind,
            CompileErrorKind::InvalidArgument {
                what: "block weight".into(),
                value: "heavy".into()
            }
        );
    }

    #[test]
    fn empty_items() {
        let program = compile("test", "{|}", false).unwrap();
        assert_eq!(program.blocks[0].items.len(), 2);
    }
}
