//! `tlpfuzz coverage`: inspect a saved edge map.

use std::path::Path;

use anyhow::{Context, Result};
use tlpfuzz::coverage::CoverageMap;

use crate::style::{counts_table, print_heading, print_hint};

pub fn run(path: &Path, top: usize, json: bool) -> Result<()> {
    let map = CoverageMap::load_snapshot(path)
        .with_context(|| format!("reading coverage map {}", path.display()))?;
    anyhow::ensure!(!map.is_empty(), "coverage map {} is empty", path.display());

    let summary = map.summary();
    let hottest = map.top_edges(top);

    if json {
        let value = serde_json::json!({
            "summary": summary,
            "top_edges": hottest,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print!("{}", summary.to_human_readable());
    if hottest.is_empty() {
        print_hint("no edge was hit; is the target instrumented?");
        return Ok(());
    }
    print_heading("Hottest edges");
    let rows: Vec<Vec<String>> = hottest
        .iter()
        .map(|e| vec![e.edge.to_string(), e.hits.to_string()])
        .collect();
    println!("{}", counts_table(&["edge", "hits"], &rows));
    Ok(())
}
