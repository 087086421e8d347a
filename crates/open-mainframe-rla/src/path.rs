//! QSYS object paths.
//!
//! Database files live in the QSYS file system and are named by integrated
//! file system paths of the form:
//!
//! ```text
//! /QSYS.LIB/MYLIB.LIB/MYFILE.FILE/MYMBR.MBR
//! /QSYS.LIB/MYLIB.LIB/MYFILE.FILE            (member defaults to *FIRST)
//! /QSYS.LIB/%LIBL%.LIB/MYFILE.FILE          (library list)
//! ```

use std::fmt;

use crate::error::{RlaError, RlaResult};

/// Member special value selecting the first member of the file.
pub const FIRST_MEMBER: &str = "*FIRST";
/// Library special value for the job's library list.
pub const LIBRARY_LIST: &str = "*LIBL";

const MAX_NAME_LEN: usize = 10;

/// A library/file/member triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QsysPath {
    pub library: String,
    pub file: String,
    pub member: String,
}

fn check_name(kind: &str, name: &str) -> RlaResult<String> {
    let upper = name.trim().to_ascii_uppercase();
    if upper.is_empty() || upper.len() > MAX_NAME_LEN {
        return Err(RlaError::invalid(
            kind,
            format!("'{}' must be 1 to {} characters", name, MAX_NAME_LEN),
        ));
    }
    if upper.contains('/') || upper.contains('.') {
        return Err(RlaError::invalid(kind, format!("'{}' contains a separator", name)));
    }
    Ok(upper)
}

fn strip_suffix<'a>(part: &'a str, suffix: &str) -> RlaResult<&'a str> {
    let upper = part.to_ascii_uppercase();
    if !upper.ends_with(suffix) {
        return Err(RlaError::invalid(
            "path",
            format!("'{}' does not end in {}", part, suffix),
        ));
    }
    Ok(&part[..part.len() - suffix.len()])
}

impl QsysPath {
    pub fn new(library: &str, file: &str, member: &str) -> RlaResult<Self> {
        Ok(Self {
            library: check_name("library", library)?,
            file: check_name("file", file)?,
            member: check_name("member", member)?,
        })
    }

    /// Parse an IFS path into its library, file and member.
    pub fn parse(path: &str) -> RlaResult<Self> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parts.len() < 3 || parts.len() > 4 || !parts[0].eq_ignore_ascii_case("QSYS.LIB") {
            return Err(RlaError::invalid(
                "path",
                format!("'{}' is not /QSYS.LIB/library.LIB/file.FILE[/member.MBR]", path),
            ));
        }
        let library = match strip_suffix(parts[1], ".LIB")? {
            lib if lib.eq_ignore_ascii_case("%LIBL%") => LIBRARY_LIST,
            lib => lib,
        };
        let file = strip_suffix(parts[2], ".FILE")?;
        let member = match parts.get(3) {
            Some(part) => strip_suffix(part, ".MBR")?,
            None => FIRST_MEMBER,
        };
        Self::new(library, file, member)
    }

    /// `LIBRARY/FILE` as CL commands expect it.
    pub fn qualified_file(&self) -> String {
        format!("{}/{}", self.library, self.file)
    }
}

impl fmt::Display for QsysPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let library = if self.library == LIBRARY_LIST {
            "%LIBL%"
        } else {
            &self.library
        };
        write!(f, "/QSYS.LIB/{}.LIB/{}.FILE", library, self.file)?;
        if self.member != FIRST_MEMBER {
            write!(f, "/{}.MBR", self.member)?;
        }
        Ok(())
    }
}
