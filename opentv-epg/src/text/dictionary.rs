//! Bit-level prefix-code dictionary used to expand OpenTV compressed text.
//!
//! The dictionary file holds one `SYMBOL=BITS` entry per line. `SYMBOL` is
//! literal text, or one of `<SP>` (space), `<NL>` (newline) and `<END>`
//! (end of text). Blank lines and `#` comments are ignored; `#=` defines
//! the `#` symbol itself.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{DecodeError, EpgError};

/// What a leaf of the tree produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Text(String),
    /// Stops decoding; the remaining bits are ignored.
    End,
}

#[derive(Debug, Clone, Default)]
struct Node {
    children: [Option<u32>; 2],
    symbol: Option<Symbol>,
}

/// A decoding tree for one country.
///
/// Loaded once per session and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Dictionary {
    country: String,
    nodes: Vec<Node>,
    entries: usize,
}

impl Dictionary {
    fn empty(country: &str) -> Self {
        Self {
            country: country.to_uppercase(),
            nodes: vec![Node::default()],
            entries: 0,
        }
    }

    /// Path of the dictionary file for `country` inside `dir`.
    pub fn path_for(dir: &Path, country: &str) -> PathBuf {
        dir.join(format!("{}.dict", country.to_uppercase()))
    }

    /// Load the dictionary for `country` from `dir`.
    pub fn load(dir: &Path, country: &str) -> Result<Self, EpgError> {
        let path = Self::path_for(dir, country);
        let source = fs::read_to_string(&path).map_err(|e| EpgError::DictionaryLoadFailed {
            country: country.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let dictionary = Self::parse(country, &source)?;
        debug!(
            "[Dictionary] Loaded {} entries for {} from {:?}",
            dictionary.entries, dictionary.country, path
        );
        Ok(dictionary)
    }

    /// Build a dictionary from the text of a dictionary file.
    pub fn parse(country: &str, source: &str) -> Result<Self, EpgError> {
        let fail = |line: usize, reason: &str| EpgError::DictionaryLoadFailed {
            country: country.to_string(),
            reason: format!("line {}: {}", line, reason),
        };

        let mut dictionary = Self::empty(country);

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() || (line.starts_with('#') && !line.starts_with("#=")) {
                continue;
            }

            let (symbol, code) = line
                .rsplit_once('=')
                .ok_or_else(|| fail(line_no, "missing '='"))?;
            let code = code.trim();
            if code.is_empty() || !code.bytes().all(|b| b == b'0' || b == b'1') {
                return Err(fail(line_no, "code must be a non-empty string of 0 and 1"));
            }

            let symbol = match symbol {
                "" => return Err(fail(line_no, "empty symbol")),
                "<SP>" => Symbol::Text(" ".to_string()),
                "<NL>" => Symbol::Text("\n".to_string()),
                "<END>" => Symbol::End,
                s => Symbol::Text(s.to_string()),
            };

            dictionary
                .insert(code, symbol)
                .map_err(|reason| fail(line_no, reason))?;
        }

        if dictionary.entries == 0 {
            return Err(EpgError::DictionaryLoadFailed {
                country: country.to_string(),
                reason: "no entries".to_string(),
            });
        }

        Ok(dictionary)
    }

    fn insert(&mut self, code: &str, symbol: Symbol) -> Result<(), &'static str> {
        let mut node = 0usize;

        for bit in code.bytes().map(|b| (b - b'0') as usize) {
            if self.nodes[node].symbol.is_some() {
                return Err("code extends a shorter code");
            }
            node = match self.nodes[node].children[bit] {
                Some(next) => next as usize,
                None => {
                    self.nodes.push(Node::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children[bit] = Some(next as u32);
                    next
                }
            };
        }

        let leaf = &mut self.nodes[node];
        if leaf.symbol.is_some() {
            return Err("duplicate code");
        }
        if leaf.children.iter().any(Option::is_some) {
            return Err("code is a prefix of a longer code");
        }
        leaf.symbol = Some(symbol);
        self.entries += 1;
        Ok(())
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Expand `bytes`, most significant bit first.
    ///
    /// Decoding restarts at the root after every leaf and stops at the end of
    /// input or at an `<END>` symbol. Bits left over at the end that do not
    /// complete a code are padding.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        if self.entries == 0 {
            return Err(DecodeError::EmptyDictionary);
        }

        let mut out = String::with_capacity(bytes.len() * 2);
        let mut node = 0usize;

        for bit_offset in 0..bytes.len() * 8 {
            let bit = (bytes[bit_offset / 8] >> (7 - bit_offset % 8)) & 0x01;
            node = match self.nodes[node].children[bit as usize] {
                Some(next) => next as usize,
                None => return Err(DecodeError::InvalidCode { bit_offset }),
            };

            match &self.nodes[node].symbol {
                Some(Symbol::Text(text)) => {
                    out.push_str(text);
                    node = 0;
                }
                Some(Symbol::End) => break,
                None => {}
            }
        }

        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{ascii_dictionary, encode};
    use super::*;

    #[test]
    fn test_decode_ascii() {
        let dictionary = ascii_dictionary();
        assert_eq!(dictionary.len(), 96);
        for text in ["Foo..", "News at Ten", "A", "1234567", "(WS) Drama!"] {
            assert_eq!(dictionary.decode(&encode(text)).unwrap(), text);
        }
    }

    #[test]
    fn test_variable_length_codes() {
        let dictionary = Dictionary::parse("NZL", "e=0\nt=10\n<SP>=110\n<END>=111\n").unwrap();
        // "te e" = 10 0 110 0 111 -> 1001 1001 11(00 0000)
        assert_eq!(dictionary.decode(&[0b1001_1001, 0b1100_0000]).unwrap(), "te e");
        // Input exhausted mid-code: trailing bits are padding
        assert_eq!(dictionary.decode(&[0b1000_0001]).unwrap(), "teeeee");
    }

    #[test]
    fn test_invalid_code() {
        let dictionary = ascii_dictionary();
        // 0000001 is not assigned
        let err = dictionary.decode(&[0b0000_0010]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidCode { bit_offset: 6 });
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(ascii_dictionary().decode(&[]).unwrap(), "");
    }

    #[test]
    fn test_parse_rejects_conflicts() {
        assert!(Dictionary::parse("GBR", "a=01\nb=01\n").is_err());
        assert!(Dictionary::parse("GBR", "a=01\nb=011\n").is_err());
        assert!(Dictionary::parse("GBR", "a=011\nb=01\n").is_err());
        assert!(Dictionary::parse("GBR", "a=0x1\n").is_err());
        assert!(Dictionary::parse("GBR", "# nothing\n\n").is_err());
    }

    #[test]
    fn test_parse_equals_symbol() {
        let dictionary = Dictionary::parse("GBR", "==0\n<END>=1\n").unwrap();
        assert_eq!(dictionary.decode(&[0b0010_0000]).unwrap(), "==");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Dictionary::load(Path::new("/nonexistent"), "gbr").unwrap_err();
        match err {
            EpgError::DictionaryLoadFailed { country, reason } => {
                assert_eq!(country, "gbr");
                assert!(reason.contains("GBR.dict"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
