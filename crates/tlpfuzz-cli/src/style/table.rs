//! Tables via comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Two columns: key and value.
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = styled_table();
    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}

/// A header row followed by right-aligned numeric rows, first column left.
pub fn counts_table(columns: &[&str], rows: &[Vec<String>]) -> Table {
    let mut table = styled_table();
    let header: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header);
    for row in rows {
        table.add_row(row.iter().enumerate().map(|(i, value)| {
            let cell = Cell::new(value);
            if i == 0 {
                cell
            } else {
                cell.set_alignment(CellAlignment::Right)
            }
        }));
    }
    table
}

pub fn print_info_table(entries: &[(&str, String)]) {
    println!("{}", info_table(entries));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_table_renders_every_row() {
        super::super::set_no_color(true);
        let rendered = counts_table(
            &["oracle", "checks"],
            &[
                vec!["TLP_WHERE".into(), "12".into()],
                vec!["NOREC".into(), "3".into()],
            ],
        )
        .to_string();
        assert!(rendered.contains("oracle"));
        assert!(rendered.contains("TLP_WHERE"));
        assert!(rendered.contains("NOREC"));
    }

    #[test]
    fn info_table_keeps_entry_order() {
        super::super::set_no_color(true);
        let rendered = info_table(&[("seed", "7".into()), ("steps", "100".into())]).to_string();
        let seed = rendered.find("seed").expect("seed row");
        let steps = rendered.find("steps").expect("steps row");
        assert!(seed < steps);
    }
}
