//! JVM class file constant pool handling
//!
//! All symbolic references in a class file (class names, descriptors,
//! signatures, string constants) live in `CONSTANT_Utf8` entries of the
//! constant pool. Relocation rewrites those entries and re-encodes their
//! length prefix; everything after the pool is copied byte for byte.
//!
//! Layout: `[magic:u4][minor:u2][major:u2][cp_count:u2][cp_info...][rest]`

use crate::error::{Result, ShadeError};
use crate::relocation::{Form, Relocator};

/// Magic number at the start of every class file
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Class file major version for Java 8; later versions add one per release
const JAVA_8_MAJOR: u16 = 52;

mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Major class file version for a Java release (`21` -> `65`)
pub fn major_for_java(release: u16) -> u16 {
    release.saturating_sub(8) + JAVA_8_MAJOR
}

#[derive(Debug, Clone, Copy)]
enum PoolEntry<'a> {
    Utf8(&'a [u8]),
    Class(u16),
    /// Any other constant, tag byte included
    Raw(&'a [u8]),
    /// Second slot of a long or double
    Gap,
}

/// A parsed class file, borrowing the original bytes
#[derive(Debug)]
pub struct ClassFile<'a> {
    data: &'a [u8],
    major: u16,
    pool: Vec<PoolEntry<'a>>,
    pool_end: usize,
}

struct Reader<'a> {
    entry: &'a str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn malformed(&self, reason: impl Into<String>) -> ShadeError {
        ShadeError::MalformedClass {
            entry: self.entry.to_string(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(self.malformed(format!("truncated at offset {}", self.pos))),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl<'a> ClassFile<'a> {
    /// Parse the header and constant pool of a class file
    pub fn parse(entry: &'a str, data: &'a [u8]) -> Result<Self> {
        let mut r = Reader { entry, data, pos: 0 };

        if r.u32()? != CLASS_MAGIC {
            return Err(r.malformed("bad magic number"));
        }
        let _minor = r.u16()?;
        let major = r.u16()?;
        let count = r.u16()?;
        if count == 0 {
            return Err(r.malformed("empty constant pool"));
        }

        let mut pool = Vec::with_capacity(count as usize);
        // Index 0 is unused by the format
        pool.push(PoolEntry::Gap);

        while pool.len() < count as usize {
            let start = r.pos;
            let tag = r.u8()?;
            match tag {
                tag::UTF8 => {
                    let len = r.u16()? as usize;
                    pool.push(PoolEntry::Utf8(r.take(len)?));
                }
                tag::CLASS => pool.push(PoolEntry::Class(r.u16()?)),
                tag::LONG | tag::DOUBLE => {
                    r.take(8)?;
                    pool.push(PoolEntry::Raw(&data[start..r.pos]));
                    pool.push(PoolEntry::Gap);
                }
                tag::INTEGER
                | tag::FLOAT
                | tag::FIELD_REF
                | tag::METHOD_REF
                | tag::INTERFACE_METHOD_REF
                | tag::NAME_AND_TYPE
                | tag::DYNAMIC
                | tag::INVOKE_DYNAMIC => {
                    r.take(4)?;
                    pool.push(PoolEntry::Raw(&data[start..r.pos]));
                }
                tag::METHOD_HANDLE => {
                    r.take(3)?;
                    pool.push(PoolEntry::Raw(&data[start..r.pos]));
                }
                tag::STRING | tag::METHOD_TYPE | tag::MODULE | tag::PACKAGE => {
                    r.take(2)?;
                    pool.push(PoolEntry::Raw(&data[start..r.pos]));
                }
                other => {
                    return Err(r.malformed(format!(
                        "unknown constant pool tag {} at offset {}",
                        other, start
                    )))
                }
            }
        }
        if pool.len() != count as usize {
            return Err(r.malformed("long or double constant overruns the pool"));
        }

        Ok(Self {
            data,
            major,
            pool,
            pool_end: r.pos,
        })
    }

    pub fn major_version(&self) -> u16 {
        self.major
    }

    fn utf8(&self, index: u16) -> Option<&'a [u8]> {
        match self.pool.get(index as usize) {
            Some(PoolEntry::Utf8(bytes)) => Some(*bytes),
            _ => None,
        }
    }

    /// Internal names of every class this file references.
    ///
    /// Array types are reduced to their element class; primitive arrays are skipped.
    pub fn class_references(&self) -> Vec<String> {
        let mut refs: Vec<String> = self
            .pool
            .iter()
            .filter_map(|entry| match entry {
                PoolEntry::Class(index) => self.utf8(*index),
                _ => None,
            })
            .filter_map(|name| {
                let name = String::from_utf8_lossy(name);
                let element = name.trim_start_matches('[');
                if element.len() == name.len() {
                    Some(name.into_owned())
                } else {
                    element
                        .strip_prefix('L')
                        .and_then(|n| n.strip_suffix(';'))
                        .map(str::to_string)
                }
            })
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Every `CONSTANT_Utf8` value, for reference scanning
    pub fn utf8_constants(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.pool.iter().filter_map(|entry| match entry {
            PoolEntry::Utf8(bytes) => Some(*bytes),
            _ => None,
        })
    }

    /// Re-encode the class with relocated constants. `None` when nothing changed.
    pub fn relocate(
        &self,
        entry: &str,
        relocator: &Relocator,
        hits: &mut [usize],
    ) -> Result<Option<Vec<u8>>> {
        let forms = [Form::Slashed, Form::Dotted];
        let mut rewritten: Vec<(usize, Vec<u8>)> = Vec::new();

        for (index, pool_entry) in self.pool.iter().enumerate() {
            if let PoolEntry::Utf8(bytes) = pool_entry {
                if let Some(new_bytes) = relocator.rewrite(bytes, &forms, hits) {
                    if new_bytes.len() > u16::MAX as usize {
                        return Err(ShadeError::MalformedClass {
                            entry: entry.to_string(),
                            reason: format!(
                                "relocated constant #{} exceeds {} bytes",
                                index,
                                u16::MAX
                            ),
                        });
                    }
                    rewritten.push((index, new_bytes));
                }
            }
        }

        if rewritten.is_empty() {
            return Ok(None);
        }

        let growth: usize = rewritten.iter().map(|(_, b)| b.len()).sum();
        let mut out = Vec::with_capacity(self.data.len() + growth);
        // magic, minor, major, constant_pool_count
        out.extend_from_slice(&self.data[..10]);

        let mut replacements = rewritten.into_iter().peekable();
        for (index, pool_entry) in self.pool.iter().enumerate() {
            match pool_entry {
                PoolEntry::Utf8(bytes) => {
                    let value: &[u8] = match replacements.peek() {
                        Some((i, new_bytes)) if *i == index => new_bytes.as_slice(),
                        _ => *bytes,
                    };
                    out.push(tag::UTF8);
                    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
                    out.extend_from_slice(value);
                    if matches!(replacements.peek(), Some((i, _)) if *i == index) {
                        replacements.next();
                    }
                }
                PoolEntry::Class(name_index) => {
                    out.push(tag::CLASS);
                    out.extend_from_slice(&name_index.to_be_bytes());
                }
                PoolEntry::Raw(bytes) => out.extend_from_slice(bytes),
                PoolEntry::Gap => {}
            }
        }

        out.extend_from_slice(&self.data[self.pool_end..]);
        Ok(Some(out))
    }
}

/// Builds minimal class files. Used by tests across the workspace.
#[doc(hidden)]
pub mod fixture {
    use super::{tag, CLASS_MAGIC};

    /// A class named `this_class` extending `java/lang/Object`, whose pool
    /// references every class in `refs` plus one string constant per entry
    /// of `strings`. Method bodies are omitted.
    pub fn class_bytes(major: u16, this_class: &str, refs: &[&str], strings: &[&str]) -> Vec<u8> {
        let mut pool: Vec<Vec<u8>> = Vec::new();
        let class_index = |pool: &mut Vec<Vec<u8>>, name: &str| -> u16 {
            pool.push(utf8(name));
            let name_index = pool.len() as u16;
            let mut c = vec![tag::CLASS];
            c.extend_from_slice(&name_index.to_be_bytes());
            pool.push(c);
            pool.len() as u16
        };

        let this_index = class_index(&mut pool, this_class);
        let super_index = class_index(&mut pool, "java/lang/Object");
        for name in refs {
            class_index(&mut pool, name);
        }
        for s in strings {
            pool.push(utf8(s));
            let value_index = pool.len() as u16;
            let mut c = vec![tag::STRING];
            c.extend_from_slice(&value_index.to_be_bytes());
            pool.push(c);
        }
        // A long constant takes two pool slots
        let mut long = vec![tag::LONG];
        long.extend_from_slice(&42u64.to_be_bytes());
        pool.push(long);
        let count = pool.len() as u16 + 2;

        let mut out = Vec::new();
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&major.to_be_bytes());
        out.extend_from_slice(&count.to_be_bytes());
        for constant in &pool {
            out.extend_from_slice(constant);
        }
        // access flags, this, super, interfaces, fields, methods, attributes
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&this_index.to_be_bytes());
        out.extend_from_slice(&super_index.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        out
    }

    fn utf8(s: &str) -> Vec<u8> {
        let mut v = vec![tag::UTF8];
        v.extend_from_slice(&(s.len() as u16).to_be_bytes());
        v.extend_from_slice(s.as_bytes());
        v
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::class_bytes;
    use super::*;
    use crate::relocation::RelocationSpec;

    fn relocator() -> Relocator {
        Relocator::new(&[RelocationSpec::new("a.b", "x.y")]).unwrap()
    }

    #[test]
    fn test_parse_references() {
        let data = class_bytes(65, "a/b/C", &["a/b/D", "[La/b/E;", "[I"], &[]);
        let class = ClassFile::parse("a/b/C.class", &data).unwrap();
        assert_eq!(class.major_version(), 65);
        assert_eq!(
            class.class_references(),
            vec!["a/b/C", "a/b/D", "a/b/E", "java/lang/Object"]
        );
    }

    #[test]
    fn test_relocate_rewrites_pool_and_keeps_tail() {
        let data = class_bytes(61, "a/b/C", &["a/b/D"], &["a.b.D"]);
        let class = ClassFile::parse("a/b/C.class", &data).unwrap();
        let mut hits = vec![0];
        let out = class.relocate("a/b/C.class", &relocator(), &mut hits).unwrap().unwrap();
        assert_eq!(hits[0], 3);

        let relocated = ClassFile::parse("x/y/C.class", &out).unwrap();
        assert_eq!(
            relocated.class_references(),
            vec!["java/lang/Object", "x/y/C", "x/y/D"]
        );
        let strings: Vec<String> = relocated
            .utf8_constants()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        assert!(strings.contains(&"x.y.D".to_string()));
        assert!(!strings.iter().any(|s| s.starts_with("a/b") || s.starts_with("a.b")));
        // Trailing class structure is untouched
        assert_eq!(&out[out.len() - 14..], &data[data.len() - 14..]);
    }

    #[test]
    fn test_relocate_unaffected_class_returns_none() {
        let data = class_bytes(52, "com/example/Main", &["java/util/List"], &[]);
        let class = ClassFile::parse("com/example/Main.class", &data).unwrap();
        let mut hits = vec![0];
        assert!(class.relocate("Main.class", &relocator(), &mut hits).unwrap().is_none());
        assert_eq!(hits[0], 0);
    }

    #[test]
    fn test_malformed_class_is_rejected() {
        let err = ClassFile::parse("Bad.class", b"\xCA\xFE\xBA\xBE\x00").unwrap_err();
        assert!(matches!(err, ShadeError::MalformedClass { .. }));

        let err = ClassFile::parse("Bad.class", b"not a class file").unwrap_err();
        assert!(err.to_string().contains("bad magic"));

        let mut data = class_bytes(52, "a/b/C", &[], &[]);
        data[10] = 99; // first constant's tag
        assert!(ClassFile::parse("Bad.class", &data).is_err());
    }

    #[test]
    fn test_major_for_java() {
        assert_eq!(major_for_java(8), 52);
        assert_eq!(major_for_java(17), 61);
        assert_eq!(major_for_java(21), 65);
    }
}
