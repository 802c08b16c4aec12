use std::io::{self, Write};

use serde::Serialize;

use crate::app::SearchResult;
use crate::inspector::InspectorLine;
use crate::stow::StoreReceipt;
use crate::wado::LinkListing;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_attributes(lines: &[InspectorLine]) -> io::Result<()> {
        Self::print_json(&lines)
    }

    pub fn print_links(links: &[LinkListing]) -> io::Result<()> {
        Self::print_json(&links)
    }

    pub fn print_store(receipt: &StoreReceipt) -> io::Result<()> {
        Self::print_json(receipt)
    }

    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
