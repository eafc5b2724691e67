use crate::config::{AnalysisConfig, PartitionMode, SplitPolicy};
use anyhow::{bail, Context, Result};
use clap::{App, Arg, ArgMatches};

/// Create and return the clap App.
pub fn app() -> App<'static> {
    App::new("ELF topology and Bader charge analysis")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("elf file")
                .required(true)
                .index(1)
                .help("The ELFCAR to analyse."),
        )
        .arg(
            Arg::new("charge file")
                .short('c')
                .long("charge")
                .takes_value(true)
                .required(true)
                .help("The CHGCAR to integrate over the partitions.")
                .long_help(
                    "The charge density file integrated over the partitioned topological \
                     field. Must share the voxel counts of the ELFCAR.",
                ),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .takes_value(true)
                .possible_values(["zero-flux", "voronoi", "hybrid"])
                .default_value("zero-flux")
                .help("How charge is divided at basin boundaries."),
        )
        .arg(
            Arg::new("split")
                .short('p')
                .long("split")
                .takes_value(true)
                .possible_values(["equal", "electronegativity"])
                .default_value("equal")
                .help("How shared features apportion charge to their atoms."),
        )
        .arg(
            Arg::new("resolution")
                .short('r')
                .long("resolution")
                .takes_value(true)
                .help("Iso-value sweep step of the bifurcation search."),
        )
        .arg(
            Arg::new("downscale")
                .short('d')
                .long("downscale")
                .takes_value(true)
                .help("Resample both grids to at most this many voxels.")
                .long_help(
                    "Resample both grids to at most this many total voxels before the \
                     analysis. The main runtime and memory knob for dense inputs.",
                ),
        )
        .arg(
            Arg::new("threads")
                .short('J')
                .long("threads")
                .takes_value(true)
                .default_value("0")
                .help("Worker threads; 0 uses every logical CPU."),
        )
        .arg(
            Arg::new("no spin")
                .long("no-spin")
                .takes_value(false)
                .help("Analyse the total field even when spin blocks are present."),
        )
        .arg(
            Arg::new("shell depth")
                .long("shell-depth")
                .takes_value(true)
                .help("Maximum birth threshold of an atomic core node."),
        )
        .arg(
            Arg::new("metal depth")
                .long("metal-depth")
                .takes_value(true)
                .help("Depth below which a valence node is metallic."),
        )
        .arg(
            Arg::new("covalent angle")
                .long("covalent-angle")
                .takes_value(true)
                .help("Minimum bond alignment angle in degrees."),
        )
        .arg(
            Arg::new("bond ratio")
                .long("bond-ratio")
                .takes_value(true)
                .help("Maximum (d_a + d_b) / d_ab for an on-axis feature."),
        )
        .arg(
            Arg::new("electride elf")
                .long("electride-elf")
                .takes_value(true)
                .help("Electride gate: minimum field value at the maximum."),
        )
        .arg(
            Arg::new("electride depth")
                .long("electride-depth")
                .takes_value(true)
                .help("Electride gate: minimum depth."),
        )
        .arg(
            Arg::new("electride charge")
                .long("electride-charge")
                .takes_value(true)
                .help("Electride gate: minimum integrated charge."),
        )
        .arg(
            Arg::new("electride volume")
                .long("electride-volume")
                .takes_value(true)
                .help("Electride gate: minimum basin volume."),
        )
        .arg(
            Arg::new("electride radius")
                .long("electride-radius")
                .takes_value(true)
                .help("Electride gate: minimum distance to an atom."),
        )
        .arg(
            Arg::new("bond scale")
                .long("bond-scale")
                .takes_value(true)
                .help("Bond detection scale over summed covalent radii."),
        )
        .arg(
            Arg::new("strict cores")
                .long("strict-cores")
                .takes_value(false)
                .help("Fail when an atom has no detected core instead of warning."),
        )
        .arg(
            Arg::new("graph")
                .short('g')
                .long("graph")
                .takes_value(true)
                .help("Write the bifurcation graph as JSON to this file."),
        )
        .arg(
            Arg::new("structure")
                .short('o')
                .long("structure")
                .takes_value(true)
                .default_value("labeled_POSCAR")
                .help("Where to write the labeled structure."),
        )
}

/// Holds the arguments passed to the binary.
pub struct Args {
    pub elf_file: String,
    pub charge_file: String,
    pub config: AnalysisConfig,
    /// Whether to analyse spin channels separately when present.
    pub spin: bool,
    pub graph_file: Option<String>,
    pub structure_file: String,
}

fn parse_into<T: std::str::FromStr>(
    matches: &ArgMatches,
    name: &str,
    target: &mut T,
) -> Result<()>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = matches.value_of(name) {
        *target = value
            .parse::<T>()
            .with_context(|| format!("failed to parse --{}", name.replace(' ', "-")))?;
    }
    Ok(())
}

impl Args {
    /// Initialises the structure from the command-line matches.
    pub fn new(matches: ArgMatches) -> Result<Self> {
        let elf_file = matches
            .value_of("elf file")
            .context("no ELFCAR supplied")?
            .to_string();
        let charge_file = matches
            .value_of("charge file")
            .context("no CHGCAR supplied")?
            .to_string();
        let mut config = AnalysisConfig::default();
        config.mode = match matches.value_of("mode") {
            Some("voronoi") => PartitionMode::VoronoiPlane,
            Some("hybrid") => PartitionMode::Hybrid,
            Some("zero-flux") | None => PartitionMode::ZeroFlux,
            Some(other) => bail!("unknown partition mode {:?}", other),
        };
        config.split_policy = match matches.value_of("split") {
            Some("electronegativity") => SplitPolicy::Electronegativity,
            _ => SplitPolicy::EqualSplit,
        };
        parse_into(&matches, "resolution", &mut config.resolution)?;
        parse_into(&matches, "threads", &mut config.threads)?;
        parse_into(&matches, "shell depth", &mut config.shell_depth)?;
        parse_into(&matches, "metal depth", &mut config.metal_depth_cutoff)?;
        parse_into(&matches, "covalent angle", &mut config.min_covalent_angle)?;
        parse_into(&matches, "bond ratio", &mut config.min_covalent_bond_ratio)?;
        parse_into(&matches, "electride elf", &mut config.electride_elf_min)?;
        parse_into(&matches, "electride depth", &mut config.electride_depth_min)?;
        parse_into(&matches, "electride charge", &mut config.electride_charge_min)?;
        parse_into(&matches, "electride volume", &mut config.electride_volume_min)?;
        parse_into(&matches, "electride radius", &mut config.electride_radius_min)?;
        parse_into(&matches, "bond scale", &mut config.bond_scale)?;
        if let Some(value) = matches.value_of("downscale") {
            config.max_voxels =
                Some(value.parse().context("failed to parse --downscale")?);
        }
        config.strict_cores = matches.is_present("strict cores");
        Ok(Self {
            elf_file,
            charge_file,
            config,
            spin: !matches.is_present("no spin"),
            graph_file: matches.value_of("graph").map(String::from),
            structure_file: matches
                .value_of("structure")
                .unwrap_or("labeled_POSCAR")
                .to_string(),
        })
    }
}
