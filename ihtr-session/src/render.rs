//! Human-readable rendering of decoded traces.
//!
//! Symbol resolution happens here and only here: the decoded traces keep
//! raw addresses, and a resolver that knows nothing simply leaves the
//! addresses in hex. A failed lookup never aborts a dump.

use std::io;

use ihtr_decoder::OrderedTrace;
use ihtr_protocol::{BtsRecord, LbrStackEntry};

/// Best-effort address-to-name resolution.
pub trait ResolveSymbol {
    /// The symbolic name covering `address`, or `None` when unknown.
    fn resolve(&mut self, address: u64) -> Option<String>;
}

/// Resolver that knows no symbols; every address renders as hex.
pub struct NoSymbols;

impl ResolveSymbol for NoSymbols {
    fn resolve(&mut self, _address: u64) -> Option<String> {
        None
    }
}

/// Direction a trace is printed in.
///
/// The underlying [`OrderedTrace`] is always oldest-first; this only
/// affects presentation. Printed indices are chronological positions
/// either way, so record 0 is the oldest branch in both orders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

fn resolved(resolver: &mut impl ResolveSymbol, address: u64) -> String {
    resolver
        .resolve(address)
        .unwrap_or_else(|| format!("{address:#x}"))
}

fn rows<T>(
    trace: &OrderedTrace<T>,
    order: DisplayOrder,
) -> Box<dyn Iterator<Item = (usize, &T)> + '_> {
    match order {
        DisplayOrder::OldestFirst => Box::new(trace.iter().enumerate()),
        DisplayOrder::NewestFirst => Box::new(trace.iter().enumerate().rev()),
    }
}

/// Print an LBR trace, one branch per line.
pub fn render_lbr_trace(
    out: &mut impl io::Write,
    trace: &OrderedTrace<LbrStackEntry>,
    resolver: &mut impl ResolveSymbol,
    order: DisplayOrder,
) -> io::Result<()> {
    writeln!(out, "LBR trace: {} branch records", trace.len())?;
    for (position, entry) in rows(trace, order) {
        writeln!(
            out,
            "  [{position:4}] {} -> {}",
            resolved(resolver, entry.from),
            resolved(resolver, entry.to)
        )?;
    }
    Ok(())
}

/// Print a BTS trace, one branch per line with its auxiliary flags.
pub fn render_bts_trace(
    out: &mut impl io::Write,
    trace: &OrderedTrace<BtsRecord>,
    resolver: &mut impl ResolveSymbol,
    order: DisplayOrder,
) -> io::Result<()> {
    writeln!(out, "BTS trace: {} branch records", trace.len())?;
    for (position, record) in rows(trace, order) {
        writeln!(
            out,
            "  [{position:4}] {} -> {} (misc {:#x})",
            resolved(resolver, record.from),
            resolved(resolver, record.to),
            record.misc
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ihtr_decoder::decode_lbr_ring;

    use super::*;

    struct MapResolver(HashMap<u64, String>);

    impl ResolveSymbol for MapResolver {
        fn resolve(&mut self, address: u64) -> Option<String> {
            self.0.get(&address).cloned()
        }
    }

    fn sample_trace() -> OrderedTrace<LbrStackEntry> {
        let ring = [
            LbrStackEntry {
                from: 0xdead_beef,
                to: 0x1000,
            },
            LbrStackEntry {
                from: 0x2000,
                to: 0x3000,
            },
        ];
        decode_lbr_ring(&ring, 1).unwrap()
    }

    #[test]
    fn test_unresolved_addresses_render_as_hex() {
        let mut out = Vec::new();
        render_lbr_trace(
            &mut out,
            &sample_trace(),
            &mut NoSymbols,
            DisplayOrder::OldestFirst,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("0xdeadbeef -> 0x1000"));
    }

    #[test]
    fn test_resolved_addresses_render_by_name() {
        let mut resolver = MapResolver(HashMap::from([(0xdead_beef, "main".to_owned())]));
        let mut out = Vec::new();
        render_lbr_trace(
            &mut out,
            &sample_trace(),
            &mut resolver,
            DisplayOrder::OldestFirst,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("main -> 0x1000"));
    }

    #[test]
    fn test_newest_first_reverses_lines_not_positions() {
        let mut out = Vec::new();
        render_lbr_trace(
            &mut out,
            &sample_trace(),
            &mut NoSymbols,
            DisplayOrder::NewestFirst,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let first_row = text.lines().nth(1).unwrap();
        // The newest branch prints first but keeps its chronological
        // position index.
        assert!(first_row.contains("[   1]"), "{first_row}");
    }
}
