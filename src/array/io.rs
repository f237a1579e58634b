//! Textual list I/O for device arrays
//!
//! # Format
//!
//! ```text
//! 3(1 2 3)                       short list (<= 10 elements) on one line
//! 12                             long list, one value per line
//! (
//! 0.5
//! ...
//! )
//! 100{0}                         uniform list
//! (1 2 3)                        unsized list (read only)
//! coeffs List<scalar> 2(2 3);    keyword entry
//! List<scalar> 2(2 3)            unkeyed entry
//! ```
//!
//! Values read back equal values written, element for element.

use super::{DeviceArray, DeviceElement};
use crate::{DeviceError, Result};
use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

/// Lists up to this length are written on a single line
const SHORT_LIST_LEN: usize = 10;

impl<T: DeviceElement> fmt::Display for DeviceArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.read();
        let n = values.len();

        if n > 1 {
            // Compare the written form so that 0 and -0 stay distinct
            let first = values[0].to_string();
            if values[1..]
                .iter()
                .all(|v| *v == values[0] && v.to_string() == first)
            {
                return write!(f, "{n}{{{first}}}");
            }
        }

        if n <= SHORT_LIST_LEN {
            write!(f, "{n}(")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{value}")?;
            }
            return f.write_str(")");
        }

        writeln!(f, "{n}")?;
        writeln!(f, "(")?;
        for value in values.iter() {
            writeln!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

impl<T: DeviceElement> FromStr for DeviceArray<T> {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = ListParser::new(s);
        parser.type_tag::<T>()?;
        let list = parser.list::<T>()?;
        parser.expect_end()?;
        list.into_array()
    }
}

impl<T: DeviceElement> DeviceArray<T> {
    /// Write the list to a text stream
    ///
    /// # Errors
    ///
    /// Returns `Io` if the stream rejects the write
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write!(writer, "{self}")?;
        Ok(())
    }

    /// Write the list as an entry, optionally under `keyword`
    ///
    /// `Some("coeffs")` produces `coeffs List<scalar> 2(2 3);`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the stream rejects the write
    pub fn write_entry<W: Write>(&self, keyword: Option<&str>, writer: &mut W) -> Result<()> {
        match keyword {
            Some(keyword) => writeln!(writer, "{keyword} List<{}> {self};", T::TYPE_NAME)?,
            None => write!(writer, "List<{}> {self}", T::TYPE_NAME)?,
        }
        Ok(())
    }

    /// Construct from a text stream holding one list
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed input, `Io` for stream failures and
    /// `AllocationFailure` if the list does not fit in device memory
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        text.parse()
    }

    /// Find `keyword` in a stream of entries and construct its list
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the keyword is missing, an entry is malformed or
    /// the entry holds a different element type
    pub fn read_entry<R: BufRead>(keyword: &str, reader: &mut R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        let mut parser = ListParser::new(&text);
        while !parser.at_end() {
            let key = parser
                .word()
                .ok_or_else(|| DeviceError::parse("expected entry keyword"))?;
            if key != keyword {
                parser.skip_entry()?;
                continue;
            }

            parser.type_tag::<T>()?;
            let list = parser.list::<T>()?;
            parser.expect(';')?;
            return list.into_array();
        }
        Err(DeviceError::parse(format!("keyword '{keyword}' not found")))
    }

    /// Persist the list to a file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written
    pub async fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = format!("{self}\n");
        tokio::fs::write(path, text).await?;
        Ok(())
    }

    /// Load a list written by [`DeviceArray::write_file`]
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Parse` if it is malformed
    pub async fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        text.parse()
    }
}

/// A list as it appears in the stream, before upload
enum ParsedList<T> {
    Values(Vec<T>),
    Uniform(usize, T),
}

impl<T: DeviceElement> ParsedList<T> {
    fn into_array(self) -> Result<DeviceArray<T>> {
        match self {
            Self::Values(values) => DeviceArray::from_slice(&values),
            Self::Uniform(len, value) => DeviceArray::with_value(len, value),
        }
    }
}

struct ListParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ListParser<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Skip whitespace and `//` comments
    fn skip_blank(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                return;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_blank();
        self.rest().is_empty()
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_blank();
        self.rest().chars().next()
    }

    fn expect(&mut self, delimiter: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == delimiter => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(c) => Err(DeviceError::parse(format!(
                "expected '{delimiter}', found '{c}' at byte {}",
                self.pos
            ))),
            None => Err(DeviceError::parse(format!(
                "expected '{delimiter}', found end of input"
            ))),
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(DeviceError::parse(format!(
                "unexpected trailing input at byte {}",
                self.pos
            )))
        }
    }

    /// Skip the remainder of an entry, including its `;`
    fn skip_entry(&mut self) -> Result<()> {
        let end = self
            .rest()
            .find(';')
            .ok_or_else(|| DeviceError::parse("unterminated entry"))?;
        self.pos += end + 1;
        Ok(())
    }

    /// Next run of characters up to whitespace or a delimiter
    fn word(&mut self) -> Option<&'a str> {
        self.skip_blank();
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || "(){};".contains(c))
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    fn value<T: DeviceElement>(&mut self) -> Result<T> {
        let token = self
            .word()
            .ok_or_else(|| DeviceError::parse(format!("expected value at byte {}", self.pos)))?;
        T::parse_token(token).ok_or_else(|| {
            DeviceError::parse(format!("invalid {} value '{token}'", T::TYPE_NAME))
        })
    }

    /// Consume a `List<type>` tag if present, checking the element type
    fn type_tag<T: DeviceElement>(&mut self) -> Result<()> {
        let rest = {
            self.skip_blank();
            self.rest()
        };
        let Some(tag) = rest.strip_prefix("List<") else {
            return Ok(());
        };
        let close = tag
            .find('>')
            .ok_or_else(|| DeviceError::parse("unterminated List<...> tag"))?;
        let name = &tag[..close];
        if name != T::TYPE_NAME {
            return Err(DeviceError::parse(format!(
                "entry holds List<{name}>, expected List<{}>",
                T::TYPE_NAME
            )));
        }
        self.pos += "List<".len() + close + 1;
        Ok(())
    }

    fn list<T: DeviceElement>(&mut self) -> Result<ParsedList<T>> {
        if self.peek() == Some('(') {
            return self.values_until_close(None).map(ParsedList::Values);
        }

        let size_token = self
            .word()
            .ok_or_else(|| DeviceError::parse("expected list size"))?;
        let len: usize = size_token
            .parse()
            .map_err(|_| DeviceError::parse(format!("invalid list size '{size_token}'")))?;

        match self.peek() {
            Some('(') => self.values_until_close(Some(len)).map(ParsedList::Values),
            Some('{') => {
                self.expect('{')?;
                let value = self.value()?;
                self.expect('}')?;
                Ok(ParsedList::Uniform(len, value))
            }
            _ => Err(DeviceError::parse(format!(
                "expected '(' or '{{' after list size {len}"
            ))),
        }
    }

    fn values_until_close<T: DeviceElement>(&mut self, expected: Option<usize>) -> Result<Vec<T>> {
        self.expect('(')?;
        let mut values = Vec::new();
        while self.peek() != Some(')') {
            if self.peek().is_none() {
                return Err(DeviceError::parse("unterminated list"));
            }
            values.push(self.value()?);
        }
        self.expect(')')?;

        match expected {
            Some(len) if len != values.len() => Err(DeviceError::parse(format!(
                "list declares {len} elements but holds {}",
                values.len()
            ))),
            _ => Ok(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_short_list() {
        let array = DeviceArray::from_slice(&[1_u32, 2, 3]).unwrap();
        assert_eq!(array.to_string(), "3(1 2 3)");
    }

    #[test]
    fn test_display_uniform_list() {
        let array = DeviceArray::with_value(100, 0.5_f64).unwrap();
        assert_eq!(array.to_string(), "100{0.5}");
    }

    #[test]
    fn test_display_empty_and_single() {
        assert_eq!(DeviceArray::<f64>::new().to_string(), "0()");
        assert_eq!(DeviceArray::from_slice(&[4_i32]).unwrap().to_string(), "1(4)");
    }

    #[test]
    fn test_display_long_list_is_multiline() {
        let values: Vec<u32> = (0..12).collect();
        let text = DeviceArray::from_slice(&values).unwrap().to_string();
        assert!(text.starts_with("12\n(\n0\n1\n"));
        assert!(text.ends_with("11\n)"));
    }

    #[test]
    fn test_parse_forms() {
        let a: DeviceArray<f64> = "3(1.5 -2 3e2)".parse().unwrap();
        assert_eq!(a.to_vec(), vec![1.5, -2.0, 300.0]);

        let b: DeviceArray<u32> = "4{7}".parse().unwrap();
        assert_eq!(b.to_vec(), vec![7; 4]);

        let c: DeviceArray<i32> = "  ( 1 2\n 3 ) ".parse().unwrap();
        assert_eq!(c.to_vec(), vec![1, 2, 3]);

        let d: DeviceArray<u32> = "2 // sizes\n(\n5\n6\n)".parse().unwrap();
        assert_eq!(d.to_vec(), vec![5, 6]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "3(1 2)".parse::<DeviceArray<u32>>(),
            Err(DeviceError::Parse(_))
        ));
        assert!(matches!(
            "2(1 x)".parse::<DeviceArray<u32>>(),
            Err(DeviceError::Parse(_))
        ));
        assert!(matches!(
            "2(1 2".parse::<DeviceArray<u32>>(),
            Err(DeviceError::Parse(_))
        ));
        assert!(matches!(
            "1(1) extra".parse::<DeviceArray<u32>>(),
            Err(DeviceError::Parse(_))
        ));
    }

    #[test]
    fn test_write_entry_with_keyword() {
        let array = DeviceArray::from_slice(&[2.0_f64, 3.0]).unwrap();
        let mut out = Vec::new();
        array.write_entry(Some("coeffs"), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "coeffs List<scalar> 2(2 3);\n");

        let mut out = Vec::new();
        array.write_entry(None, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "List<scalar> 2(2 3)");
    }

    #[test]
    fn test_unkeyed_entry_round_trip() {
        let array = DeviceArray::from_slice(&[2.0_f64, 3.0]).unwrap();
        let mut out = Vec::new();
        array.write_entry(None, &mut out).unwrap();

        let back = DeviceArray::<f64>::read_from(&mut out.as_slice()).unwrap();
        assert_eq!(back, array);

        let wrong = DeviceArray::<u32>::read_from(&mut out.as_slice());
        assert!(matches!(wrong, Err(DeviceError::Parse(_))));
    }

    #[test]
    fn test_signed_zeros_are_not_uniform() {
        let array = DeviceArray::from_slice(&[0.0_f64, -0.0]).unwrap();
        let text = array.to_string();
        assert_eq!(text, "2(0 -0)");

        let back: DeviceArray<f64> = text.parse().unwrap();
        let bits: Vec<u64> = back.to_vec().iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, vec![0.0_f64.to_bits(), (-0.0_f64).to_bits()]);
    }

    #[test]
    fn test_read_entry_finds_keyword() {
        let text = "coeffs List<scalar> 2(2 3);\npnf List<scalar> 2{4};\n";
        let pnf = DeviceArray::<f64>::read_entry("pnf", &mut text.as_bytes()).unwrap();
        assert_eq!(pnf.to_vec(), vec![4.0, 4.0]);

        let missing = DeviceArray::<f64>::read_entry("other", &mut text.as_bytes());
        assert!(matches!(missing, Err(DeviceError::Parse(_))));
    }

    #[test]
    fn test_read_entry_skips_other_element_types() {
        let text = "cells List<label> 3(4 0 2);\ncoeffs List<scalar> 2(0.5 1);\n";
        let cells = DeviceArray::<u32>::read_entry("cells", &mut text.as_bytes()).unwrap();
        assert_eq!(cells.to_vec(), vec![4, 0, 2]);
        let coeffs = DeviceArray::<f64>::read_entry("coeffs", &mut text.as_bytes()).unwrap();
        assert_eq!(coeffs.to_vec(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_read_entry_rejects_wrong_type() {
        let text = "cells List<scalar> 1(0.5);";
        let err = DeviceArray::<u32>::read_entry("cells", &mut text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("List<label>"));
    }

    #[test]
    fn test_stream_round_trip() {
        let values: Vec<f64> = (0..25_i32).map(|i| f64::from(i) * 0.1 - 1.0).collect();
        let array = DeviceArray::from_slice(&values).unwrap();

        let mut out = Vec::new();
        array.write_to(&mut out).unwrap();
        let back = DeviceArray::<f64>::read_from(&mut out.as_slice()).unwrap();
        assert_eq!(back.to_vec(), values);
    }
}
