//! Command Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Configuration,
    #[display("catalog error")]
    Catalog,
    #[display("{_0} failed")]
    Command(#[error(not(source))] &'static str),
    #[display("failed to write output")]
    Output,
}

/// Render an error tree for the terminal.
pub fn report(err: Error) -> miette::Report {
    miette::miette!("{err:?}")
}
