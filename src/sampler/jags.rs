//! # JAGS backend
//!
//! [`JagsSampler`] runs the `jags` command-line program on a generated script.
//!
//! ## One run
//! -----------------
//! 1. Create a private temporary directory (`tempfile`).
//! 2. Write `model.bug` (from [`ModelKind::model_code`]), `data.R`, one
//!    `initsK.R` per chain and `run.cmd`.
//! 3. Spawn `jags run.cmd` in that directory, stdout and stderr redirected to files.
//! 4. Poll the child until it exits or the wall-clock budget of
//!    [`RunConfig::timeout`] is spent.
//! 5. Read the CODA files back into [`PosteriorDraws`].
//!
//! The child process and the directory are owned by guards: whatever the outcome
//! (success, engine error, timeout, panic of the caller) the child is killed and
//! reaped and the directory removed when the run returns. On Unix the child leads
//! its own process group and the whole group is killed, so helpers started by a
//! wrapper script do not outlive the run.
//!
//! ## Schedule
//! -----------------
//! `adapt` adaptive iterations, then `samples` burn-in iterations, then `samples`
//! monitored iterations kept every `thin`-th.
use std::{
    fs::File,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use super::{coda::read_coda_output, rdump, PosteriorDraws, RunConfig, Sampler};
use crate::{
    bsam_errors::SamplerError,
    model::ModelKind,
    prepare::bundle::{DataValue, SamplerData},
};

const MODEL_FILE: &str = "model.bug";
const DATA_FILE: &str = "data.R";
const SCRIPT_FILE: &str = "run.cmd";
const STDOUT_FILE: &str = "jags.out";
const STDERR_FILE: &str = "jags.err";
const CODA_STEM: &str = "CODA";
const RNG_NAME: &str = "base::Mersenne-Twister";

/// Longest engine output quoted in a [`SamplerError::Failed`].
const MAX_DIAGNOSTICS: usize = 4096;

/// Sampler backed by a local JAGS installation.
#[derive(Debug, Clone)]
pub struct JagsSampler {
    program: PathBuf,
    poll_interval: Duration,
}

impl Default for JagsSampler {
    fn default() -> Self {
        JagsSampler {
            program: PathBuf::from("jags"),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl JagsSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `jags` executable instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// How often a running child is checked for completion.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Command script driving one JAGS run.
pub fn render_script(model: ModelKind, config: &RunConfig) -> String {
    let mut lines = vec![
        format!("model in \"{MODEL_FILE}\""),
        format!("data in \"{DATA_FILE}\""),
        format!("compile, nchains({})", config.chains),
    ];
    lines.extend((1..=config.chains).map(|k| format!("parameters in \"inits{k}.R\", chain({k})")));
    lines.push("initialize".to_string());
    lines.push(format!("adapt {}", config.adapt));
    lines.push(format!("update {}", config.samples));
    lines.extend(
        model
            .monitored_nodes()
            .iter()
            .map(|node| format!("monitor {node}, thin({})", config.thin.max(1))),
    );
    lines.push(format!("update {}", config.samples));
    lines.push(format!("coda *, stem({CODA_STEM})"));
    lines.push("exit".to_string());

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Initial values of chain `chain` (1-based), with a per-chain RNG seed when seeded.
pub fn render_inits(data: &SamplerData, chain: usize, seed: Option<u64>) -> String {
    let mut out = rdump::render(data.inits.iter().map(|(k, v)| (k.as_str(), v)));
    if let Some(seed) = seed {
        out.push_str(&rdump::render_string(".RNG.name", RNG_NAME));
        // JAGS seeds are R integers
        let chain_seed = (seed.wrapping_add(chain as u64) % i32::MAX as u64) as f64;
        out.push_str(&rdump::render([(
            ".RNG.seed",
            &DataValue::Scalar(chain_seed),
        )]));
    }
    out
}

/// Kills and reaps the child if the run is left before it exited.
struct ChildGuard {
    child: Child,
    done: bool,
}

impl ChildGuard {
    /// Wait for the child, at most `timeout` when set.
    fn wait(&mut self, timeout: Option<Duration>, poll: Duration) -> Result<ExitStatus, SamplerError> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.done = true;
                return Ok(status);
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Err(SamplerError::Timeout(limit));
                }
            }
            std::thread::sleep(poll);
        }
    }
}

/// SIGKILL every process of the group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: killpg only sends a signal, no memory is shared with the callee
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // stragglers of a finished leader are swept too
        #[cfg(unix)]
        {
            if let Err(e) = kill_group(self.child.id()) {
                if e.raw_os_error() != Some(libc::ESRCH) {
                    warn!("unable to kill sampler process group {}: {e}", self.child.id());
                }
            }
        }

        if !self.done {
            #[cfg(not(unix))]
            {
                if let Err(e) = self.child.kill() {
                    warn!("unable to kill sampler process {}: {e}", self.child.id());
                }
            }
            let _ = self.child.wait();
        }
    }
}

fn read_lossy(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Trailing part of the engine output, where JAGS reports its errors.
fn diagnostics(dir: &Path) -> String {
    let text = format!(
        "{}\n{}",
        read_lossy(&dir.join(STDOUT_FILE)).trim(),
        read_lossy(&dir.join(STDERR_FILE)).trim()
    );
    let text = text.trim();
    if text.len() <= MAX_DIAGNOSTICS {
        return text.to_string();
    }
    let mut cut = text.len() - MAX_DIAGNOSTICS;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}

/// JAGS may report a failed command and still exit with status 0.
fn reports_error(stdout: &str) -> bool {
    stdout.contains("RUNTIME ERROR")
        || stdout.contains("Compilation error")
        || stdout.lines().any(|l| l.trim_start().starts_with("Error"))
}

impl JagsSampler {
    fn write_inputs(&self, dir: &Path, data: &SamplerData, config: &RunConfig) -> Result<(), SamplerError> {
        std::fs::write(dir.join(MODEL_FILE), data.model.model_code())?;
        std::fs::write(
            dir.join(DATA_FILE),
            rdump::render(data.data.iter().map(|(k, v)| (k.as_str(), v))),
        )?;
        for chain in 1..=config.chains {
            std::fs::write(
                dir.join(format!("inits{chain}.R")),
                render_inits(data, chain, config.seed),
            )?;
        }
        std::fs::write(dir.join(SCRIPT_FILE), render_script(data.model, config))?;
        Ok(())
    }

    fn spawn(&self, dir: &Path) -> Result<ChildGuard, SamplerError> {
        let stdout = File::create(dir.join(STDOUT_FILE))?;
        let stderr = File::create(dir.join(STDERR_FILE))?;

        let mut command = Command::new(&self.program);
        command
            .arg(SCRIPT_FILE)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|source| SamplerError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        Ok(ChildGuard { child, done: false })
    }
}

impl Sampler for JagsSampler {
    fn run(&self, data: &SamplerData, config: &RunConfig) -> Result<PosteriorDraws, SamplerError> {
        // removed on drop, after the child guard below
        let workdir = tempfile::Builder::new().prefix("bsam-jags-").tempdir()?;
        let dir = workdir.path();

        self.write_inputs(dir, data, config)?;

        let mut child = self.spawn(dir)?;
        debug!(
            "JAGS run of {} started in {} (pid {})",
            data.model,
            dir.display(),
            child.child.id()
        );

        let status = child.wait(config.timeout, self.poll_interval)?;
        let stdout = read_lossy(&dir.join(STDOUT_FILE));

        if !status.success() || reports_error(&stdout) {
            return Err(SamplerError::Failed {
                status: status.to_string(),
                diagnostics: diagnostics(dir),
            });
        }

        if !dir.join(format!("{CODA_STEM}index.txt")).exists() {
            return Err(SamplerError::Failed {
                status: status.to_string(),
                diagnostics: format!("no CODA output produced\n{}", diagnostics(dir)),
            });
        }

        let draws = read_coda_output(dir, CODA_STEM, config.chains)?;
        draws.require(data.model.monitored_nodes())?;
        Ok(draws)
    }
}

#[cfg(test)]
mod jags_test {
    use super::*;
    use indexmap::IndexMap;

    fn tiny_data(model: ModelKind) -> SamplerData {
        let mut inits = IndexMap::new();
        inits.insert(
            "x".to_string(),
            DataValue::Matrix {
                rows: 2,
                cols: 2,
                values: vec![1.0, 2.0, 3.0, 4.0],
            },
        );
        SamplerData {
            model,
            data: IndexMap::new(),
            inits,
            layout: Vec::new(),
        }
    }

    #[test]
    fn test_render_script() {
        let config = RunConfig {
            adapt: 100,
            samples: 200,
            thin: 4,
            chains: 2,
            ..RunConfig::default()
        };
        let script = render_script(ModelKind::Dcrws, &config);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "model in \"model.bug\"");
        assert_eq!(lines[2], "compile, nchains(2)");
        assert_eq!(lines[3], "parameters in \"inits1.R\", chain(1)");
        assert_eq!(lines[4], "parameters in \"inits2.R\", chain(2)");
        assert!(lines.contains(&"adapt 100"));
        assert!(lines.contains(&"monitor b, thin(4)"));
        assert_eq!(lines.iter().filter(|l| **l == "update 200").count(), 2);
        assert_eq!(*lines.last().unwrap(), "exit");
    }

    #[test]
    fn test_render_inits_seeded() {
        let data = tiny_data(ModelKind::Dcrw);
        let inits = render_inits(&data, 2, Some(40));
        assert!(inits.starts_with("`x` <- structure(c(1, 3, 2, 4), .Dim = c(2L, 2L))\n"));
        assert!(inits.contains("`.RNG.name` <- \"base::Mersenne-Twister\""));
        assert!(inits.contains("`.RNG.seed` <- 42\n"));

        let unseeded = render_inits(&data, 1, None);
        assert!(!unseeded.contains(".RNG"));
    }

    #[test]
    fn test_reports_error() {
        assert!(reports_error("Compiling model graph\nRUNTIME ERROR:\nNon-conforming"));
        assert!(reports_error("Error parsing file"));
        assert!(!reports_error("Welcome to JAGS\nAdapting 1000\nUpdating 5000\n"));
    }

    #[test]
    fn test_missing_program() {
        let sampler = JagsSampler::new().with_program("/nonexistent/bsam-no-jags");
        let err = sampler
            .run(&tiny_data(ModelKind::Dcrw), &RunConfig::default())
            .unwrap_err();
        assert!(matches!(err, SamplerError::Launch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-jags");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let sampler = JagsSampler::new()
            .with_program(&script)
            .with_poll_interval(Duration::from_millis(10));
        let config = RunConfig {
            timeout: Some(Duration::from_millis(200)),
            ..RunConfig::default()
        };

        let start = Instant::now();
        let err = sampler
            .run(&tiny_data(ModelKind::Dcrw), &config)
            .unwrap_err();
        assert_eq!(err, SamplerError::Timeout(Duration::from_millis(200)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    /// `true` while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| {
                // state follows the parenthesised command name
                stat.rsplit(')')
                    .next()
                    .and_then(|rest| rest.split_whitespace().next())
                    .is_some_and(|state| state != "Z" && state != "X")
            })
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("helper.pid");
        let script = dir.path().join("wrapper-jags");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nsh -c 'echo $$ > \"{}\"; exec sleep 30' &\nwait\n",
                pid_file.display()
            ),
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let sampler = JagsSampler::new()
            .with_program(&script)
            .with_poll_interval(Duration::from_millis(10));
        let config = RunConfig {
            timeout: Some(Duration::from_millis(500)),
            ..RunConfig::default()
        };
        let err = sampler
            .run(&tiny_data(ModelKind::Dcrw), &config)
            .unwrap_err();
        assert_eq!(err, SamplerError::Timeout(Duration::from_millis(500)));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_running(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_running(pid), "helper process {pid} outlived the run");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_run_carries_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken-jags");
        std::fs::write(&script, "#!/bin/sh\necho 'RUNTIME ERROR: bad node' \nexit 1\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let sampler = JagsSampler::new().with_program(&script);
        match sampler.run(&tiny_data(ModelKind::Dcrw), &RunConfig::default()) {
            Err(SamplerError::Failed { diagnostics, .. }) => {
                assert!(diagnostics.contains("bad node"))
            }
            other => panic!("expected a failed run, got {other:?}"),
        }
    }
}
