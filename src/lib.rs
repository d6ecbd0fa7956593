#[macro_use]
extern crate error_chain;

#[macro_use]
extern crate derivative;

#[macro_use]
extern crate derive_builder;

pub mod aeg;
pub mod alias;
pub mod cfg;
pub mod dataflow;
pub mod detector;
pub mod environment;
pub mod expanded;
pub mod expr;
pub mod instr;
pub mod loader;
pub mod monitor;
pub mod pool;
pub mod solver;
pub mod taint;
pub mod util;

pub mod error {
    error_chain! {
        types {
            Error, ErrorKind, ResultExt, Result;
        }

        foreign_links {
            ParseBigIntError(::num_bigint::ParseBigIntError);
            RSmt2(::rsmt2::errors::Error);
            IOError(::std::io::Error);
            SerdeYAML(::serde_yaml::Error);
            Bincode(::bincode::Error);
            Nix(::nix::Error);
        }

        errors {
            Analysis(m: String) {
                description("An error in the analysis")
                display("Analysis error: {}", m)
            }
            Sort {
                description("Sort error")
                display("Sort error, bits differ incorrectly")
            }
            Construction(m: String) {
                description("An AEG construction invariant was violated")
                display("Construction error: {}", m)
            }
            Usage(m: String) {
                description("Invalid usage")
                display("Usage error: {}", m)
            }
        }
    }
}
