use crate::io::vasp;
use crate::partition::PartitionResult;
use crate::structure::LabeledStructure;
use crate::tree::BifurcationGraph;
use prettytable::{cell, format, row, Table};
use std::fs::File;
use std::io::Write;

/// Creates a format for the output tables.
fn table_format() -> format::TableFormat {
    let line_position = &[format::LinePosition::Title, format::LinePosition::Bottom];
    let line_separator = format::LineSeparator::new('-', '+', '+', '+');
    format::FormatBuilder::new()
        .column_separator('|')
        .separators(line_position, line_separator)
        .padding(1, 1)
        .build()
}

/// Builds the atom and feature tables from a partition result. Returns the
/// contents of the atoms file and the features file.
pub fn results_tables(result: &PartitionResult) -> (String, String) {
    let mut atoms_table = Table::new();
    atoms_table.set_format(table_format());
    atoms_table
        .set_titles(row![c => "#", "El", "X", "Y", "Z", "Charge", "Volume", "Ox. State"]);
    for site in result.atoms() {
        let element = match &site.kind {
            crate::partition::SiteKind::Atom { element } => element.clone(),
            _ => unreachable!(),
        };
        atoms_table.add_row(row![r =>
            format!("{}", site.id + 1),
            element,
            format!("{:.6}", site.position[0]),
            format!("{:.6}", site.position[1]),
            format!("{:.6}", site.position[2]),
            format!("{:.6}", site.charge),
            format!("{:.6}", site.volume),
            format!("{:+.3}", site.oxidation_state)
        ]);
    }

    let mut features_table = Table::new();
    features_table.set_format(table_format());
    features_table.set_titles(
        row![c => "#", "Kind", "X", "Y", "Z", "Charge", "Volume", "Ox. State", "Shared With"],
    );
    for site in result.features() {
        let kind = site
            .kind
            .feature_kind()
            .expect("features() yields only feature sites");
        let mut name = String::from(kind.name());
        if site.spin_unpaired {
            name.push_str(" (spin unpaired)");
        }
        let shared = if site.shared_with.is_empty() {
            String::from("-")
        } else {
            site.shared_with
                .iter()
                .map(|a| format!("{}", a + 1))
                .collect::<Vec<String>>()
                .join(", ")
        };
        features_table.add_row(row![r =>
            format!("{}", site.id + 1),
            name,
            format!("{:.6}", site.position[0]),
            format!("{:.6}", site.position[1]),
            format!("{:.6}", site.position[2]),
            format!("{:.6}", site.charge),
            format!("{:.6}", site.volume),
            format!("{:+.3}", site.oxidation_state),
            shared
        ]);
    }

    let mut atoms_file = atoms_table.to_string();
    atoms_file.push_str(&format!(
        "  Grid Integral: {:>18.4}\n  Assigned Charge: {:>16.4}\n  Deviation: {:>22.4e}\n",
        result.total_integral,
        result.assigned_total,
        result.assigned_total - result.total_integral,
    ));
    for warning in &result.warnings {
        atoms_file.push_str(&format!("  Warning: {}\n", warning));
    }
    (atoms_file, features_table.to_string())
}

/// Writes the result tables to ACF.dat and FCF.dat.
pub fn write(atoms_file: String, features_file: String) -> std::io::Result<()> {
    let mut acf = File::create("ACF.dat")?;
    acf.write_all(atoms_file.as_bytes())?;
    let mut fcf = File::create("FCF.dat")?;
    fcf.write_all(features_file.as_bytes())?;
    Ok(())
}

/// Writes the labeled structure POSCAR.
pub fn write_structure(
    structure: &LabeledStructure,
    filename: &str,
) -> std::io::Result<()> {
    let mut file = File::create(filename)?;
    file.write_all(vasp::write_poscar(structure).as_bytes())
}

/// Writes the bifurcation graph as JSON for external plotting.
pub fn write_graph(graph: &BifurcationGraph, filename: &str) -> std::io::Result<()> {
    let json = graph
        .to_json()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = File::create(filename)?;
    file.write_all(json.as_bytes())
}
