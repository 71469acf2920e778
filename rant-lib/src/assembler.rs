//! Saving programs to, and loading them from, the binary container
//!
//! ```text
//! "RPTN" | u8 section count | (u8 id, u32 offset)* | section bodies
//! ```
//!
//! All integers are little-endian and offsets are absolute. The code and string sections are
//! required, all others are optional and ids the loader does not know are skipped. Imports are
//! stored by name only, [Engine::load](crate::engine::Engine::load) links them again.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{BlockInfo, Program, ProgramRegex, Query};
use crate::opcode::{ByteCursor, DecodeError};

pub const MAGIC: &[u8; 4] = b"RPTN";
/// newest container version this crate reads and the one it writes
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum SectionId {
    #[display(fmt = "version")]
    Version = 0x00,
    #[display(fmt = "code")]
    Code = 0x01,
    #[display(fmt = "string")]
    Strings = 0x02,
    #[display(fmt = "block")]
    Blocks = 0x03,
    #[display(fmt = "regex")]
    Regexes = 0x04,
    #[display(fmt = "query")]
    Queries = 0x05,
    #[display(fmt = "metadata")]
    Metadata = 0x06,
}

impl SectionId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use SectionId::*;
        Some(match byte {
            0x00 => Version,
            0x01 => Code,
            0x02 => Strings,
            0x03 => Blocks,
            0x04 => Regexes,
            0x05 => Queries,
            0x06 => Metadata,
            _ => return None,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Not a valid program")]
    NotAProgram,

    #[error("Invalid data format: the {0} section is missing")]
    MissingSection(SectionId),

    #[error("Unsupported format version {0}, the newest supported version is {FORMAT_VERSION}")]
    UnsupportedVersion(u16),

    #[error("Invalid data format in the {section} section: {message}")]
    Malformed { section: SectionId, message: String },

    #[error("Unresolved import '{0}'")]
    UnresolvedImport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
struct Metadata {
    name: String,
    imports: Vec<String>,
}

fn write_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_le_bytes());
}

fn write_strings<'s>(strings: impl ExactSizeIterator<Item = &'s str>) -> Vec<u8> {
    let mut out = vec![];
    write_u32(&mut out, strings.len() as u32);
    for s in strings {
        write_u32(&mut out, s.len() as u32);
        out.extend_from_slice(s.as_bytes());
    }
    out
}

/// lays out the header, directory and bodies of a container
pub fn assemble(sections: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let header_len = MAGIC.len() + 1 + sections.len() * 5;
    let mut out = Vec::with_capacity(header_len + sections.iter().map(|(_, b)| b.len()).sum::<usize>());
    out.extend_from_slice(MAGIC);
    out.push(sections.len() as u8);
    let mut offset = header_len;
    for (id, body) in sections {
        out.push(*id);
        write_u32(&mut out, offset as u32);
        offset += body.len();
    }
    for (_, body) in sections {
        out.extend_from_slice(body);
    }
    out
}

/// Serializes `program`. Only fails if one of the postcard encoded tables can't be encoded.
pub fn save(program: &Program) -> Result<Vec<u8>, postcard::Error> {
    let mut code = Vec::with_capacity(program.bytecode.len() + 4);
    write_u32(&mut code, program.bytecode.len() as u32);
    code.extend_from_slice(&program.bytecode);

    let metadata = Metadata {
        name: program.name.clone(),
        imports: program.reference_names.clone(),
    };
    let mut sections = vec![
        (SectionId::Version as u8, FORMAT_VERSION.to_le_bytes().to_vec()),
        (SectionId::Code as u8, code),
        (
            SectionId::Strings as u8,
            write_strings(program.strings.iter().map(String::as_str)),
        ),
    ];
    if !program.blocks.is_empty() {
        sections.push((SectionId::Blocks as u8, postcard::to_allocvec(&program.blocks)?));
    }
    if !program.regexes.is_empty() {
        sections.push((
            SectionId::Regexes as u8,
            write_strings(program.regexes.iter().map(|r| r.source.as_str())),
        ));
    }
    if !program.queries.is_empty() {
        sections.push((SectionId::Queries as u8, postcard::to_allocvec(&program.queries)?));
    }
    sections.push((SectionId::Metadata as u8, postcard::to_allocvec(&metadata)?));

    let out = assemble(&sections);
    log::debug!("saved '{}' as {} bytes", program.name, out.len());
    Ok(out)
}

struct Section<'a> {
    id: SectionId,
    cursor: ByteCursor<'a>,
    body: &'a [u8],
}

impl<'a> Section<'a> {
    fn malformed(&self, message: impl ToString) -> LoadError {
        LoadError::Malformed {
            section: self.id,
            message: message.to_string(),
        }
    }

    fn read_u32(&mut self) -> Result<u32, LoadError> {
        let id = self.id;
        self.cursor.read_u32().map_err(|e| LoadError::Malformed {
            section: id,
            message: e.to_string(),
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        let id = self.id;
        self.cursor.take(n).map_err(|e| LoadError::Malformed {
            section: id,
            message: e.to_string(),
        })
    }

    fn strings(&mut self) -> Result<Vec<String>, LoadError> {
        let count = self.read_u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(self.body.len()));
        for _ in 0..count {
            let len = self.read_u32()? as usize;
            let bytes = self.take(len)?;
            let s = std::str::from_utf8(bytes).map_err(|e| self.malformed(e))?;
            strings.push(s.to_owned());
        }
        Ok(strings)
    }

    fn postcard<T: for<'de> Deserialize<'de>>(&self) -> Result<T, LoadError> {
        let rest = self.body.get(self.cursor.position()..).unwrap_or_default();
        postcard::take_from_bytes(rest)
            .map(|(value, _)| value)
            .map_err(|e| self.malformed(e))
    }
}

/// Reads a program saved with [save]. The returned program has no resolved imports.
pub fn load(bytes: &[u8]) -> Result<Program, LoadError> {
    let mut cursor = ByteCursor::new(bytes);
    match cursor.take(MAGIC.len()) {
        Ok(magic) if magic == MAGIC => {}
        _ => return Err(LoadError::NotAProgram),
    }
    let directory_err = |e: DecodeError| LoadError::Malformed {
        section: SectionId::Version,
        message: format!("broken section directory: {}", e),
    };
    let count = cursor.read_u8().map_err(directory_err)?;

    let mut sections = vec![];
    for _ in 0..count {
        let id = cursor.read_u8().map_err(directory_err)?;
        let offset = cursor.read_u32().map_err(directory_err)? as usize;
        let Some(id) = SectionId::from_byte(id) else {
            log::debug!("skipping unknown section 0x{:02x}", id);
            continue;
        };
        if offset > bytes.len() {
            return Err(LoadError::Malformed {
                section: id,
                message: format!("offset {} is past the end of the data", offset),
            });
        }
        sections.push(Section {
            id,
            cursor: ByteCursor::at(bytes, offset),
            body: bytes,
        });
    }
    let mut find = |id: SectionId| {
        sections
            .iter()
            .position(|s| s.id == id)
            .map(|idx| sections.swap_remove(idx))
    };

    if let Some(mut section) = find(SectionId::Version) {
        let version = section
            .take(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))?;
        if version > FORMAT_VERSION {
            return Err(LoadError::UnsupportedVersion(version));
        }
    }

    let mut code = find(SectionId::Code).ok_or(LoadError::MissingSection(SectionId::Code))?;
    let len = code.read_u32()? as usize;
    let bytecode = code.take(len)?.to_vec();

    let strings = find(SectionId::Strings)
        .ok_or(LoadError::MissingSection(SectionId::Strings))?
        .strings()?;

    let blocks: Vec<BlockInfo> = match find(SectionId::Blocks) {
        Some(section) => {
            let blocks: Vec<BlockInfo> = section.postcard()?;
            if let Some(bad) = blocks.iter().find(|b| b.end_address as usize > bytecode.len()) {
                return Err(section.malformed(format!(
                    "block end {} is outside of the code",
                    bad.end_address
                )));
            }
            blocks
        }
        None => vec![],
    };

    let regexes = match find(SectionId::Regexes) {
        Some(mut section) => {
            let sources = section.strings()?;
            let mut regexes = Vec::with_capacity(sources.len());
            for source in sources {
                let regex = regex_lite::Regex::new(&source).map_err(|e| section.malformed(e))?;
                regexes.push(ProgramRegex { source, regex });
            }
            regexes
        }
        None => vec![],
    };

    let queries: Vec<Query> = match find(SectionId::Queries) {
        Some(section) => section.postcard()?,
        None => vec![],
    };

    let metadata: Metadata = match find(SectionId::Metadata) {
        Some(section) => section.postcard()?,
        None => Metadata::default(),
    };

    log::debug!(
        "loaded '{}': {} bytes of code, {} strings, {} imports",
        metadata.name,
        bytecode.len(),
        strings.len(),
        metadata.imports.len()
    );
    Ok(Program {
        name: metadata.name,
        bytecode,
        strings,
        blocks,
        regexes,
        queries,
        references: vec![],
        reference_names: metadata.imports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::vm::{run, RunOptions};

    fn strings_section(strings: &[&str]) -> Vec<u8> {
        write_strings(strings.iter().copied())
    }

    fn code_section(code: &[u8]) -> Vec<u8> {
        let mut out = vec![];
        write_u32(&mut out, code.len() as u32);
        out.extend_from_slice(code);
        out
    }

    #[test]
    fn saved_programs_run_the_same() {
        let src = "{a|b|c} <noun ?//^e//> [rep:3][sep:-]{x|y} [open:c;private]z[close]";
        let program = compile("greeting", src, true).unwrap();
        let loaded = load(&save(&program).unwrap()).unwrap();
        assert_eq!(loaded, program);

        let src = "{a|b|c}{d|e}[num:1;100]";
        let program = compile("greeting", src, false).unwrap();
        let loaded = load(&save(&program).unwrap()).unwrap();
        for seed in 0..8 {
            let options = RunOptions::default();
            assert_eq!(
                run(&program, seed, &options).unwrap(),
                run(&loaded, seed, &options).unwrap()
            );
        }
    }

    #[test]
    fn layout_of_required_sections() {
        let program = compile("p", "hi", false).unwrap();
        let bytes = save(&program).unwrap();
        assert_eq!(&bytes[..4], b"RPTN");
        let count = bytes[4] as usize;
        let directory: Vec<(u8, u32)> = (0..count)
            .map(|i| {
                let at = 5 + i * 5;
                let offset = u32::from_le_bytes(bytes[at + 1..at + 5].try_into().unwrap());
                (bytes[at], offset)
            })
            .collect();
        let (_, strings_at) = directory.iter().find(|(id, _)| *id == 0x02).unwrap();
        let at = *strings_at as usize;
        assert_eq!(&bytes[at..at + 4], &1u32.to_le_bytes());
        assert_eq!(&bytes[at + 4..at + 8], &2u32.to_le_bytes());
        assert_eq!(&bytes[at + 8..at + 10], b"hi");
    }

    #[test]
    fn foreign_data_is_rejected() {
        assert_eq!(load(b"RPTX\x00"), Err(LoadError::NotAProgram));
        assert_eq!(load(b"RP"), Err(LoadError::NotAProgram));
    }

    #[test]
    fn minimal_container_loads() {
        let bytes = assemble(&[
            (0x02, strings_section(&["hey"])),
            (0x01, code_section(&[0x01, 0, 0, 0, 0])),
        ]);
        let program = load(&bytes).unwrap();
        assert_eq!(program.strings, ["hey"]);
        let out = run(&program, 0, &RunOptions::default()).unwrap();
        assert_eq!(out.main(), "hey");
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let bytes = assemble(&[
            (0x01, code_section(&[])),
            (0x7f, vec![1, 2, 3]),
            (0x02, strings_section(&[])),
        ]);
        assert!(load(&bytes).is_ok());
    }

    #[test]
    fn missing_sections_are_named() {
        let bytes = assemble(&[(0x01, code_section(&[]))]);
        let err = load(&bytes).unwrap_err();
        assert_eq!(err, LoadError::MissingSection(SectionId::Strings));
        assert_eq!(
            err.to_string(),
            "Invalid data format: the string section is missing"
        );
    }

    #[test]
    fn newer_versions_are_rejected() {
        let bytes = assemble(&[
            (0x00, 2u16.to_le_bytes().to_vec()),
            (0x01, code_section(&[])),
            (0x02, strings_section(&[])),
        ]);
        assert_eq!(load(&bytes), Err(LoadError::UnsupportedVersion(2)));
    }

    #[test]
    fn truncated_sections_are_malformed() {
        let mut code = code_section(&[0x0f, 0x0f]);
        code.truncate(5);
        let bytes = assemble(&[(0x02, strings_section(&["a"])), (0x01, code)]);
        assert!(matches!(
            load(&bytes),
            Err(LoadError::Malformed {
                section: SectionId::Code,
                ..
            })
        ));
    }
}
