use badelf::atoms::{Atoms, Lattice};
use badelf::classify::FeatureKind;
use badelf::io::{vasp, Scaling};
use badelf::structure::{DummySite, LabeledStructure};
use std::fs;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("badelf-{}-{}", std::process::id(), name));
    path
}

const CHGCAR_SPIN: &str = "\
NaCl test
1.0
  4.0 0.0 0.0
  0.0 4.0 0.0
  0.0 0.0 4.0
  Na Cl
  1 1
Direct
  0.0 0.0 0.0
  0.5 0.5 0.5

2 2 2
 1.0 2.0 3.0 4.0 5.0
 6.0 7.0 8.0
augmentation occupancies 1 4
 0.1 0.2 0.3 0.4
2 2 2
 8.0 7.0 6.0 5.0 4.0
 3.0 2.0 1.0
";

#[test]
fn vasp_read_spin_chgcar() {
    let path = temp_path("CHGCAR_spin");
    fs::write(&path, CHGCAR_SPIN).unwrap();
    let data = vasp::read(&path, Scaling::PerVolume).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(data.shape, [2, 2, 2]);
    assert_eq!(data.blocks.len(), 2);
    assert_eq!(data.atoms.symbols, vec!["Na", "Cl"]);
    assert_eq!(data.atoms.positions[1], [2., 2., 2.]);
    let volume = 64.;
    // file order runs the first axis fastest; value 2.0 sits at (1, 0, 0)
    assert_eq!(data.blocks[0][0], 1.0 / volume);
    assert_eq!(data.blocks[0][4], 2.0 / volume);
    assert_eq!(data.blocks[0][7], 8.0 / volume);
    // augmentation lines are skipped, the second block still parses
    assert_eq!(data.blocks[1][0], 8.0 / volume);
    assert_eq!(data.blocks[1][7], 1.0 / volume);
}

const ELFCAR: &str = "\
metal test
1.0
  3.0 0.0 0.0
  0.0 3.0 0.0
  0.0 0.0 3.0
  Na
  1
Direct
  0.0 0.0 0.0

2 2 2
 0.1 0.2 0.3 0.4 0.5
 0.6 0.7 0.8
";

#[test]
fn vasp_read_elfcar_is_unscaled() {
    let path = temp_path("ELFCAR");
    fs::write(&path, ELFCAR).unwrap();
    let data = vasp::read(&path, Scaling::Raw).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(data.blocks.len(), 1);
    assert_eq!(data.blocks[0][0], 0.1);
    assert_eq!(data.blocks[0][4], 0.2);
}

#[test]
fn vasp_read_cartesian_positions() {
    let poscar = "\
cartesian test
1.0
  5.0 0.0 0.0
  0.0 5.0 0.0
  0.0 0.0 5.0
  Na Cl
  1 1
Cartesian
  0.0 0.0 0.0
  2.0 2.0 2.0
";
    let path = temp_path("POSCAR_cart");
    fs::write(&path, poscar).unwrap();
    let structure = vasp::read_poscar(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(structure.atoms.positions[1], [2., 2., 2.]);
    assert!(structure.dummies.is_empty());
}

#[test]
fn vasp_negative_scale_sets_the_volume() {
    let poscar = "\
volume scale
-64.0
  1.0 0.0 0.0
  0.0 1.0 0.0
  0.0 0.0 1.0
  Na
  1
Direct
  0.0 0.0 0.0
";
    let path = temp_path("POSCAR_scale");
    fs::write(&path, poscar).unwrap();
    let structure = vasp::read_poscar(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert!((structure.atoms.lattice.volume - 64.).abs() < 1e-9);
}

#[test]
fn vasp_labeled_structure_round_trip() {
    let atoms = Atoms::new(
        Lattice::new([[6., 0., 0.], [0., 6., 0.], [0., 0., 6.]]).unwrap(),
        vec![[0., 0., 0.], [3., 3., 3.]],
        vec![String::from("Ca"), String::from("N")],
    );
    let structure = LabeledStructure {
        atoms,
        dummies: vec![
            DummySite {
                kind: FeatureKind::Electride,
                position: [1.5, 1.5, 4.5],
                charge: 0.9,
                spin_unpaired: false,
            },
            DummySite {
                kind: FeatureKind::CovalentBond { homogeneous: false },
                position: [4.5, 1.5, 1.5],
                charge: 0.4,
                spin_unpaired: false,
            },
        ],
    };
    let path = temp_path("labeled_POSCAR");
    fs::write(&path, vasp::write_poscar(&structure)).unwrap();
    let read_back = vasp::read_poscar(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(read_back.atoms.len(), 2);
    assert_eq!(read_back.atoms.symbols, vec!["Ca", "N"]);
    assert_eq!(read_back.dummies.len(), 2);
    assert_eq!(read_back.dummies[0].kind, FeatureKind::Electride);
    assert_eq!(
        read_back.dummies[1].kind,
        FeatureKind::CovalentBond { homogeneous: false }
    );
    let p = read_back.dummies[0].position;
    assert!((p[0] - 1.5).abs() < 1e-9);
    assert!((p[1] - 1.5).abs() < 1e-9);
    assert!((p[2] - 4.5).abs() < 1e-9);
}
