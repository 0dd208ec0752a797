pub mod markers {
    pub const SUCCESS: &str = "Total CPU time";
    pub const CHECKER_SUCCESS_PREFIX: &str = "Success: ";
}

pub mod files {
    pub const OUTPUT_LOG: &str = "OUTCAR";
    pub const RELAXED_STRUCTURE: &str = "CONTCAR";
    pub const INPUT_STRUCTURE: &str = "POSCAR";
    pub const SCHEDULER_OUTPUT_PREFIX: &str = "slurm-";
    pub const SCHEDULER_OUTPUT_SUFFIX: &str = ".out";
}

pub mod dirs {
    pub const THERMAL: &str = "2-thermal";
    pub const FAR_PREFIX: &str = "far-";
    pub const APP: &str = "bindflow";
    pub const LOGS: &str = "logs";
}

pub mod defaults {
    pub const POLL_INTERVAL_SECS: u64 = 60;
    pub const TOP_LAYERS: u32 = 3;
    pub const RECOVERY_ROUNDS: u32 = 1;
    pub const JOB_ID_PATTERN: &str = r"job (\d+)";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_constants() {
        assert_eq!(markers::SUCCESS, "Total CPU time");
        assert_eq!(markers::CHECKER_SUCCESS_PREFIX, "Success: ");
    }

    #[test]
    fn test_dir_constants() {
        assert_eq!(dirs::THERMAL, "2-thermal");
        assert_eq!(dirs::FAR_PREFIX, "far-");
    }

    #[test]
    fn test_job_id_pattern_has_one_group() {
        assert_eq!(defaults::JOB_ID_PATTERN.matches('(').count(), 1);
    }
}
