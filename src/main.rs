use anyhow::{ensure, Context, Result};
use badelf::analysis::{self, SpinInput};
use badelf::arguments::{app, Args};
use badelf::grid::Grid;
use badelf::io::{self, Scaling};

fn main() -> Result<()> {
    let args = Args::new(app().get_matches())?;
    println!(
        "ELF topology and Bader charge analysis ({})",
        env!("CARGO_PKG_VERSION")
    );
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.config.effective_threads())
        .build_global()
        .context("failed to build the thread pool")?;
    let elf_data = io::vasp::read(&args.elf_file, Scaling::Raw)
        .with_context(|| format!("failed to read {}", args.elf_file))?;
    let charge_data = io::vasp::read(&args.charge_file, Scaling::PerVolume)
        .with_context(|| format!("failed to read {}", args.charge_file))?;
    ensure!(
        elf_data.shape == charge_data.shape,
        "{} holds {:?} voxels but {} holds {:?}",
        args.elf_file,
        elf_data.shape,
        args.charge_file,
        charge_data.shape,
    );
    let atoms = elf_data.atoms;
    let lattice = atoms.lattice.to_cartesian;
    let shape = elf_data.shape;
    let grid = |data: Vec<f64>| Grid::new(data, shape, lattice, [0.; 3]);

    let mut elf_blocks = elf_data.blocks;
    let mut charge_blocks = charge_data.blocks;
    let polarized = args.spin && elf_blocks.len() >= 2 && charge_blocks.len() >= 2;
    let input = if polarized {
        println!("Treating the spin channels separately.");
        // ELFCAR blocks are per channel, CHGCAR blocks are total and
        // difference
        let (charge_up, charge_down) =
            io::vasp::split_spin(&charge_blocks[0], &charge_blocks[1]);
        let elf_down = elf_blocks.swap_remove(1);
        let elf_up = elf_blocks.swap_remove(0);
        SpinInput::Polarized {
            elf_up: grid(elf_up)?,
            charge_up: grid(charge_up)?,
            elf_down: grid(elf_down)?,
            charge_down: grid(charge_down)?,
        }
    } else {
        SpinInput::Restricted {
            elf: grid(elf_blocks.swap_remove(0))?,
            charge: grid(charge_blocks.swap_remove(0))?,
        }
    };

    let outcome = analysis::run(input, &atoms, &args.config, true)?;
    let features = outcome.result.features().count();
    println!(
        "Partitioned {} atoms and {} non-atomic features.",
        atoms.len(),
        features
    );
    for warning in &outcome.result.warnings {
        eprintln!("Warning: {}", warning);
    }

    let (atoms_file, features_file) = io::output::results_tables(&outcome.result);
    io::output::write(atoms_file, features_file).context("failed to write result tables")?;
    io::output::write_structure(&outcome.structure, &args.structure_file)
        .with_context(|| format!("failed to write {}", args.structure_file))?;
    if let Some(graph_file) = &args.graph_file {
        io::output::write_graph(&outcome.graph, graph_file)
            .with_context(|| format!("failed to write {}", graph_file))?;
    }
    Ok(())
}
