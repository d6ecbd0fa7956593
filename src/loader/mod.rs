//! Front-end collaborator (§1 "Out of scope: the IR front-end"): this crate
//! only needs *some* way to get a `cfg::Cfg2` per function onto disk for
//! testing and standalone use, since a real ISA lift is out of scope. The
//! module format is a YAML description of basic blocks whose instructions
//! are written in a small textual form (`loader::yaml`).

pub mod yaml;

pub use self::yaml::Module;

use crate::error::Result;
use std::path::Path;

/// Loads a module file. Kept as a free function rather than a `Loader`
/// trait dispatching on file extension, since there is exactly one
/// supported front end.
pub fn load_file(path: &Path) -> Result<Module> {
    yaml::load_file(path)
}
