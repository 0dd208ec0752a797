use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "orchestrate",
    author,
    version,
    about = "Drives slab, adsorbate and thermal relaxations for one material through SLURM.",
    long_about = "Runs the binding-energy pipeline for one material: slab relaxation, adsorbate \
relaxations, far-adsorbate relaxations for charged systems, thermal corrections and the final \
binding-energy aggregation. Every run re-derives progress from the working directories and the \
scheduler queue, so it is safe to interrupt and rerun."
)]
pub struct Cli {
    #[arg(help = "Material (slab) name, e.g. Pt111")]
    pub material: String,

    #[arg(help = "Comma-separated adsorbates, e.g. O,OH,OOH")]
    pub adsorbates: String,

    #[arg(help = "Adsorption site index passed to the generators")]
    pub site_index: String,

    #[arg(
        allow_hyphen_values = true,
        help = "Net electronic charge; non-zero adds the far-adsorbate reference stage"
    )]
    pub net_charge: String,

    #[arg(long, help = "Path to a config.toml to use instead of the XDG location")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        help = "Launch directory holding the slab directories (defaults to the current directory)"
    )]
    pub root: Option<PathBuf>,

    #[arg(long, value_name = "SECS", help = "Seconds between scheduler queue polls")]
    pub poll_interval: Option<u64>,

    #[arg(long, value_name = "SECS", help = "Give up waiting on a single job after this many seconds")]
    pub timeout: Option<u64>,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase verbosity level (-v for debug, -vv for trace)")]
    pub verbose: u8,
}
