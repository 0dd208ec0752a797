pub mod harness;
pub mod mock;

/// A minimal VASP 5 structure file declaring `atoms` platinum atoms.
pub fn poscar(atoms: usize) -> String {
    format!(
        "Pt\n1.0\n  8.0 0.0 0.0\n  0.0 8.0 0.0\n  0.0 0.0 20.0\n  Pt\n  {}\nDirect\n",
        atoms
    )
}

pub const SUCCESS_LOG: &str = " General timing and accounting informations for this job:\n Total CPU time used (sec): 1234.5\n";
pub const FAILED_LOG: &str = " ZBRENT: fatal error in bracketing\n";
