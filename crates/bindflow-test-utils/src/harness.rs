use crate::{poscar, FAILED_LOG, SUCCESS_LOG};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// A throwaway workspace with a `Support` launch directory, fake cluster
/// scripts and an XDG config pointing the driver at them.
///
/// The fake submitter "runs" the job immediately: it writes a `slurm-<id>.out`
/// record and a finished `OUTCAR`. Directories registered with
/// [`TestContext::fail_next`] get a failed log instead, once per registration.
pub struct TestContext {
    pub _temp_dir: tempfile::TempDir,
    pub test_root: PathBuf,
    pub workspace: PathBuf,
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config_extra("")
    }

    /// `extra` is appended verbatim to the generated config file.
    pub fn with_config_extra(extra: &str) -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("bindflow-test-")
            .tempdir()
            .expect("Failed to create temp dir");
        let test_root = temp_dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp dir");

        let workspace = test_root.join("workspace");
        let root = workspace.join("Support");
        let bin_dir = test_root.join("bin");
        let config_dir = test_root.join("config");
        let cache_dir = test_root.join("cache");
        let state_dir = test_root.join("state");
        for dir in [&root, &bin_dir, &config_dir, &cache_dir, &state_dir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        let ctx = Self {
            _temp_dir: temp_dir,
            test_root,
            workspace,
            root,
            bin_dir,
            config_dir,
            cache_dir,
            state_dir,
        };
        ctx.write_scripts();
        ctx.write_config(extra);
        ctx
    }

    fn script(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    fn write_script(&self, name: &str, body: &str) {
        let path = self.script(name);
        fs::write(&path, format!("#!/bin/sh\nset -e\n{}\n", body)).expect("Failed to write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
    }

    fn write_scripts(&self) {
        let state = self.state_dir.display();
        let structure = poscar(crate::mock::DEFAULT_ATOMS);

        self.write_script(
            "submit.sh",
            &format!(
                r#"dir="$1"
counter="{state}/next_id"
id=$(( $(cat "$counter" 2>/dev/null || echo 4000) + 1 ))
echo "$id" > "$counter"
target="$(pwd -P)/$dir"
echo "$target" >> "{state}/submissions"
: > "$dir/slurm-$id.out"
if [ -f "{state}/fail_next" ] && grep -qxF "$target" "{state}/fail_next"; then
  awk -v t="$target" '!done && $0 == t {{ done = 1; next }} {{ print }}' "{state}/fail_next" > "{state}/fail_next.tmp"
  mv "{state}/fail_next.tmp" "{state}/fail_next"
  printf '%s' '{failed}' > "$dir/OUTCAR"
else
  printf '%s' '{success}' > "$dir/OUTCAR"
  printf '%s' '{structure}' > "$dir/CONTCAR"
fi
echo "Submitted batch job $id""#,
                state = state,
                failed = FAILED_LOG,
                success = SUCCESS_LOG,
                structure = structure,
            ),
        );
        self.write_script(
            "squeue.sh",
            "echo \"             JOBID PARTITION     NAME     USER ST       TIME  NODES\"",
        );
        self.write_script(
            "slab.sh",
            &format!(
                "mkdir -p \"$1\"\nprintf '%s' '{}' > \"$1/POSCAR\"\necho \"slab $*\" >> \"{}/generated\"",
                structure, state
            ),
        );
        self.write_script(
            "adsorbate.sh",
            &format!(
                "mkdir -p \"../$2/$1\"\nprintf '%s' '{}' > \"../$2/$1/POSCAR\"\necho \"adsorbate $*\" >> \"{}/generated\"",
                structure, state
            ),
        );
        self.write_script(
            "far-adsorbate.sh",
            &format!(
                "mkdir -p \"../$2/far-$1\"\nprintf '%s' '{}' > \"../$2/far-$1/POSCAR\"\necho \"far $*\" >> \"{}/generated\"",
                structure, state
            ),
        );
        self.write_script("r2t.sh", "mkdir -p 2-thermal\necho \"$1\" >> staged");
        self.write_script(
            "thermal.sh",
            &format!(
                "mkdir -p \"../$2/2-thermal/$1\"\ncp \"../$2/$1/CONTCAR\" \"../$2/2-thermal/$1/POSCAR\"\necho \"thermal $*\" >> \"{}/generated\"",
                state
            ),
        );
        self.write_script("backup.sh", "mv \"$1/OUTCAR\" \"$1/OUTCAR.bak\"");
        self.write_script("getE.sh", "echo \"$1\" >> E.dat");
        self.write_script("getG.sh", "echo \"$1\" >> G.dat");
        self.write_script("binding.sh", "echo \"$1 $2\" >> binding.dat");
        self.write_script("far-binding.sh", "echo \"$1 $2\" >> far-binding.dat");
    }

    fn write_config(&self, extra: &str) {
        let s = |name: &str| format!("[\"{}\"]", self.script(name).display());
        let config = format!(
            r#"[scheduler]
submit_command = {submit}
queue_command = {queue}
poll_interval_secs = 0

[collaborators]
slab_generator = {slab}
adsorbate_generator = {ads}
far_adsorbate_generator = {far}
thermal_staging = {r2t}
thermal_generator = {thermal}
archiver = {backup}
energy_extractor = {get_e}
free_energy_extractor = {get_g}
binding_aggregator = {binding}
far_binding_aggregator = {far_binding}
{extra}"#,
            submit = s("submit.sh"),
            queue = s("squeue.sh"),
            slab = s("slab.sh"),
            ads = s("adsorbate.sh"),
            far = s("far-adsorbate.sh"),
            r2t = s("r2t.sh"),
            thermal = s("thermal.sh"),
            backup = s("backup.sh"),
            get_e = s("getE.sh"),
            get_g = s("getG.sh"),
            binding = s("binding.sh"),
            far_binding = s("far-binding.sh"),
            extra = extra,
        );
        let app_dir = self.config_dir.join("bindflow");
        fs::create_dir_all(&app_dir).expect("Failed to create config subdir");
        fs::write(app_dir.join("config.toml"), config).expect("Failed to write config");
    }

    pub fn slab_dir(&self, material: &str) -> PathBuf {
        self.root.join(material)
    }

    pub fn adsorbate_dir(&self, adsorbate: &str, material: &str) -> PathBuf {
        self.workspace.join(adsorbate).join(material)
    }

    pub fn far_dir(&self, adsorbate: &str, material: &str) -> PathBuf {
        self.workspace
            .join(adsorbate)
            .join(format!("far-{}", material))
    }

    pub fn thermal_dir(&self, adsorbate: &str, material: &str) -> PathBuf {
        self.workspace
            .join(adsorbate)
            .join("2-thermal")
            .join(material)
    }

    /// Lines of a state or result file, empty when it does not exist.
    pub fn lines(&self, path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.lines(&self.state_dir.join("submissions"))
    }

    pub fn generated(&self) -> Vec<String> {
        self.lines(&self.state_dir.join("generated"))
    }

    /// Makes the next job submitted for `work_dir` leave a failed log. Calling
    /// it twice fails the next two jobs.
    pub fn fail_next(&self, work_dir: &Path) {
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.state_dir.join("fail_next"))
            .expect("Failed to open fail_next");
        writeln!(file, "{}", work_dir.display()).expect("Failed to write fail_next");
    }
}
