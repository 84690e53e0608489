use std::io::Write;

use tracing::warn;

use crate::{contacts::ContactView, model::ContactList};

/// Plain-text renderer for terminals and logs.
pub struct TerminalView<W> {
    out: W,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn notice(&mut self, message: &str) {
        if let Err(error) = writeln!(self.out, "* {message}") {
            warn!("failed to write notice: {error}");
        }
    }

    fn write_list(&mut self, list: &ContactList, collection_uri: &str) -> std::io::Result<()> {
        writeln!(self.out, "Contacts ({collection_uri})")?;
        if list.items.is_empty() {
            writeln!(self.out, "  (none)")?;
        }
        for item in &list.items {
            let watched = match item.watched {
                Some(true) => " [watched]",
                _ => "",
            };
            writeln!(
                self.out,
                "  {:<24} {:>3} {:<9}{watched}",
                item.name(),
                item.standing.value(),
                item.standing.name()
            )?;
        }
        let mut pages = Vec::new();
        if list.previous.is_some() {
            pages.push("prev");
        }
        if list.next.is_some() {
            pages.push("next");
        }
        if !pages.is_empty() {
            writeln!(self.out, "  pages: {}", pages.join(" | "))?;
        }
        self.out.flush()
    }
}

impl<W: Write> ContactView for TerminalView<W> {
    fn render(&mut self, list: &ContactList, collection_uri: &str) {
        if let Err(error) = self.write_list(list, collection_uri) {
            warn!("failed to render contact list: {error}");
        }
    }

    fn present_error(&mut self, status: Option<u16>, url: Option<&str>, message: &str) {
        let status = status.map_or_else(|| "-".to_string(), |status| status.to_string());
        let result = writeln!(
            self.out,
            "! error status={status} url={} : {message}",
            url.unwrap_or("-")
        );
        if let Err(error) = result {
            warn!("failed to present error: {error}");
        }
    }
}
