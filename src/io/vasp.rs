use crate::atoms::{Atoms, Lattice};
use crate::classify::FeatureKind;
use crate::io::reader::BufReader;
use crate::io::{Scaling, VolumetricData};
use crate::structure::{DummySite, LabeledStructure};
use crate::utils;
use std::io;
use std::path::Path;

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn next_line(reader: &mut BufReader, buffer: &mut String) -> io::Result<String> {
    match reader.read_line(buffer) {
        Some(line) => Ok(line?.to_string()),
        None => Err(invalid("unexpected end of file")),
    }
}

fn parse_three_floats(line: &str) -> io::Result<[f64; 3]> {
    let values: Vec<f64> = line
        .split_whitespace()
        .take(3)
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| invalid(format!("bad vector line {:?}: {}", line, e)))?;
    values
        .try_into()
        .map_err(|_| invalid(format!("expected three values in {:?}", line)))
}

/// The POSCAR-style header shared by structure and volumetric files.
struct PoscarHeader {
    lattice: [[f64; 3]; 3],
    /// One symbol per site, counts already expanded.
    symbols: Vec<String>,
    /// Cartesian positions.
    positions: Vec<[f64; 3]>,
}

fn read_header(reader: &mut BufReader) -> io::Result<PoscarHeader> {
    let mut buffer = String::new();
    // comment line
    let _ = next_line(reader, &mut buffer)?;
    let scale: Vec<f64> = next_line(reader, &mut buffer)?
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| invalid(format!("bad scale line: {}", e)))?;
    let mut lattice = [[0f64; 3]; 3];
    for row in &mut lattice {
        *row = parse_three_floats(&next_line(reader, &mut buffer)?)?;
    }
    let volume =
        utils::vdot(lattice[0], utils::cross(lattice[1], lattice[2])).abs();
    // one positive value scales uniformly, one negative value targets that
    // cell volume, three values scale per axis
    let factors = match scale.len() {
        1 if scale[0] < 0. => [(-scale[0] / volume).cbrt(); 3],
        1 => [scale[0]; 3],
        3 => [scale[0], scale[1], scale[2]],
        _ => return Err(invalid("scale line must hold one or three values")),
    };
    for (row, factor) in lattice.iter_mut().zip(factors) {
        for v in row.iter_mut() {
            *v *= factor;
        }
    }

    let species_line = next_line(reader, &mut buffer)?;
    let species_tokens: Vec<String> = species_line
        .split_whitespace()
        .map(String::from)
        .collect();
    let all_counts = !species_tokens.is_empty()
        && species_tokens.iter().all(|t| t.parse::<usize>().is_ok());
    let (names, counts): (Vec<String>, Vec<usize>) = if all_counts {
        // headerless POSCAR without a symbol line
        let counts: Vec<usize> = species_tokens.iter().map(|t| t.parse().unwrap()).collect();
        let names = (0..counts.len()).map(|i| format!("E{}", i)).collect();
        (names, counts)
    } else {
        let counts = next_line(reader, &mut buffer)?
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|e| invalid(format!("bad species counts: {}", e)))?;
        (species_tokens, counts)
    };
    if names.len() != counts.len() {
        return Err(invalid("species and count lines disagree"));
    }
    let symbols: Vec<String> = names
        .iter()
        .zip(&counts)
        .flat_map(|(name, count)| std::iter::repeat(name.clone()).take(*count))
        .collect();

    let mut mode = next_line(reader, &mut buffer)?;
    if mode.trim_start().to_lowercase().starts_with('s') {
        mode = next_line(reader, &mut buffer)?;
    }
    let fractional = mode.trim_start().to_lowercase().starts_with('d');
    let mut positions = Vec::with_capacity(symbols.len());
    for _ in 0..symbols.len() {
        let p = parse_three_floats(&next_line(reader, &mut buffer)?)?;
        positions.push(if fractional {
            utils::dot(p, lattice)
        } else {
            p
        });
    }
    Ok(PoscarHeader {
        lattice,
        symbols,
        positions,
    })
}

/// Reads a VASP-style volumetric file (CHGCAR or ELFCAR).
///
/// The file stores values with the first axis fastest; they are reordered
/// into the crate's layout on read. Spin-polarized files repeat the voxel
/// count line before the second block; augmentation sections between
/// blocks are skipped.
pub fn read(path: impl AsRef<Path>, scaling: Scaling) -> io::Result<VolumetricData> {
    let mut reader = BufReader::open(path)?;
    let header = read_header(&mut reader)?;
    let lattice =
        Lattice::new(header.lattice).map_err(|e| invalid(e.to_string()))?;
    let volume = lattice.volume;
    let atoms = Atoms::new(lattice, header.positions, header.symbols);

    let mut buffer = String::new();
    let shape_line = loop {
        let line = next_line(&mut reader, &mut buffer)?;
        if !line.trim().is_empty() {
            break line;
        }
    };
    let shape: Vec<usize> = shape_line
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| invalid(format!("bad voxel count line {:?}: {}", shape_line, e)))?;
    let [nx, ny, nz]: [usize; 3] = shape
        .try_into()
        .map_err(|_| invalid("voxel count line must hold three values"))?;
    let total = nx * ny * nz;

    let scale = match scaling {
        Scaling::PerVolume => 1. / volume,
        Scaling::Raw => 1.,
    };
    let mut blocks = Vec::with_capacity(2);
    blocks.push(read_block(&mut reader, total, [nx, ny, nz], scale)?);
    // skip to the next repetition of the voxel count line, if any
    while let Some(line) = reader.read_line(&mut buffer) {
        let line = line?;
        let more: Vec<usize> = line
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<Result<_, _>>()
            .unwrap_or_default();
        if more == [nx, ny, nz] {
            blocks.push(read_block(&mut reader, total, [nx, ny, nz], scale)?);
        }
    }
    Ok(VolumetricData {
        atoms,
        shape: [nx, ny, nz],
        blocks,
    })
}

/// Reads one block of `total` values and reorders from file order (first
/// axis fastest) to the crate's order (last axis fastest).
fn read_block(
    reader: &mut BufReader,
    total: usize,
    shape: [usize; 3],
    scale: f64,
) -> io::Result<Vec<f64>> {
    let [nx, ny, nz] = shape;
    let mut raw = Vec::with_capacity(total);
    let mut buffer = String::new();
    while raw.len() < total {
        let line = next_line(reader, &mut buffer)?;
        for token in line.split_whitespace() {
            if raw.len() == total {
                return Err(invalid("voxel data block holds extra values"));
            }
            let value: f64 = token
                .parse()
                .map_err(|e| invalid(format!("bad voxel value {:?}: {}", token, e)))?;
            raw.push(value * scale);
        }
    }
    let mut data = vec![0f64; total];
    for (i, value) in raw.into_iter().enumerate() {
        let x = i % nx;
        let y = (i / nx) % ny;
        let z = i / (nx * ny);
        data[(x * ny + y) * nz + z] = value;
    }
    Ok(data)
}

/// Converts a (total, difference) CHGCAR block pair into the two channels.
pub fn split_spin(total: &[f64], difference: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let up = total
        .iter()
        .zip(difference)
        .map(|(t, d)| 0.5 * (t + d))
        .collect();
    let down = total
        .iter()
        .zip(difference)
        .map(|(t, d)| 0.5 * (t - d))
        .collect();
    (up, down)
}

/// Writes a labeled structure as a POSCAR, dummy sites carrying their
/// feature-kind labels as species symbols.
pub fn write_poscar(structure: &LabeledStructure) -> String {
    let atoms = &structure.atoms;
    let mut species: Vec<(String, usize)> = Vec::new();
    let mut push = |symbol: &str, species: &mut Vec<(String, usize)>| match species.last_mut() {
        Some((name, count)) if name == symbol => *count += 1,
        _ => species.push((symbol.to_string(), 1)),
    };
    for symbol in &atoms.symbols {
        push(symbol, &mut species);
    }
    for dummy in &structure.dummies {
        push(dummy.kind.label(), &mut species);
    }

    let mut out = String::from("badelf labeled structure\n1.0\n");
    for row in atoms.lattice.to_cartesian {
        out.push_str(&format!(
            " {:>21.16} {:>21.16} {:>21.16}\n",
            row[0], row[1], row[2]
        ));
    }
    let names: Vec<&str> = species.iter().map(|(n, _)| n.as_str()).collect();
    let counts: Vec<String> = species.iter().map(|(_, c)| c.to_string()).collect();
    out.push_str(&format!("  {}\n", names.join("  ")));
    out.push_str(&format!("  {}\n", counts.join("  ")));
    out.push_str("Direct\n");
    let fractional = |p: [f64; 3]| {
        let f = utils::dot(p, atoms.lattice.to_fractional);
        format!(
            " {:>19.16} {:>19.16} {:>19.16}\n",
            f[0].rem_euclid(1.),
            f[1].rem_euclid(1.),
            f[2].rem_euclid(1.)
        )
    };
    for p in &atoms.positions {
        out.push_str(&fractional(*p));
    }
    for dummy in &structure.dummies {
        out.push_str(&fractional(dummy.position));
    }
    out
}

/// Reads a POSCAR back into a labeled structure, recovering dummy sites
/// from their feature-kind species labels. Dummy charges are not stored in
/// the file and come back as zero.
pub fn read_poscar(path: impl AsRef<Path>) -> io::Result<LabeledStructure> {
    let mut reader = BufReader::open(path)?;
    let header = read_header(&mut reader)?;
    let lattice =
        Lattice::new(header.lattice).map_err(|e| invalid(e.to_string()))?;
    let mut symbols = Vec::new();
    let mut positions = Vec::new();
    let mut dummies = Vec::new();
    for (symbol, position) in header.symbols.iter().zip(header.positions) {
        match FeatureKind::from_label(symbol) {
            Some(kind) => dummies.push(DummySite {
                kind,
                position,
                charge: 0.,
                spin_unpaired: false,
            }),
            None => {
                symbols.push(symbol.clone());
                positions.push(position);
            }
        }
    }
    Ok(LabeledStructure {
        atoms: Atoms::new(lattice, positions, symbols),
        dummies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vasp_split_spin() {
        let (up, down) = split_spin(&[1.0, 2.0], &[0.2, -0.4]);
        assert_eq!(up, vec![0.6, 0.8]);
        assert_eq!(down, vec![0.4, 1.2]);
    }

    #[test]
    fn vasp_parse_three() {
        assert_eq!(
            parse_three_floats(" 1.0 2.0 3.0 extra").unwrap(),
            [1., 2., 3.]
        );
        assert!(parse_three_floats("1.0 oops 3.0").is_err());
    }
}
