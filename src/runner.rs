//! Launching the engine executable under a niceness, a raised stack limit
//! and a wall-clock timeout.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::settings::ModelSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which calculations a single engine invocation performs.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct EngineOptions {
    /// `-p`
    pub carrier_probs: bool,
    /// `-rj`, 10-year risk under the NHS young-women protocol.
    pub nhs_ten_year: bool,
    /// `-rl`, lifetime risk from 20 to 80.
    pub lifetime: bool,
    /// `-rr`, risk at the pedigree's censoring ages.
    pub remaining_lifetime: bool,
    /// `-ry`, 10-year risk from 40 to 50.
    pub ten_year: bool,
}

impl EngineOptions {
    pub fn flags(&self) -> Vec<&'static str> {
        [
            (self.carrier_probs, "-p"),
            (self.nhs_ten_year, "-rj"),
            (self.lifetime, "-rl"),
            (self.remaining_lifetime, "-rr"),
            (self.ten_year, "-ry"),
        ]
        .into_iter()
        .filter_map(|(on, flag)| on.then_some(flag))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.flags().is_empty()
    }
}

/// One engine invocation.
#[derive(Debug, Clone)]
pub struct EngineJob {
    pub options: EngineOptions,
    pub output: PathBuf,
    pub params: PathBuf,
    pub batch: PathBuf,
    pub incidence: PathBuf,
    /// Ethnicity reference file (breast cancer model only).
    pub ethnicity: Option<PathBuf>,
    pub niceness: u32,
}

impl EngineJob {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-o".to_string(), self.output.display().to_string()];
        args.extend(self.options.flags().into_iter().map(String::from));
        args.push("-s".to_string());
        args.push(self.params.display().to_string());
        if let Some(ethnicity) = &self.ethnicity {
            args.push("-e".to_string());
            args.push(ethnicity.display().to_string());
        }
        args.push(self.batch.display().to_string());
        args.push(self.incidence.display().to_string());
        args
    }
}

/// Runs one model's engine executable.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'a> {
    settings: &'a ModelSettings,
}

impl<'a> Engine<'a> {
    pub fn new(settings: &'a ModelSettings) -> Self {
        Self { settings }
    }

    /// Run a job and return the contents of its output file.
    pub fn run(&self, job: &EngineJob) -> Result<String> {
        match fs::remove_file(&job.output) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let args = job.args();
        let executable = self.settings.executable_path();
        tracing::info!(
            engine = %executable.display(),
            niceness = job.niceness,
            flags = ?job.options.flags(),
            "launching engine"
        );
        tracing::debug!(args = ?args, "engine command line");

        let stdout_path = job.output.with_extension("stdout");
        let stderr_path = job.output.with_extension("stderr");
        let mut command = Command::new(&executable);
        command
            .args(&args)
            .current_dir(&self.settings.home)
            .stdin(Stdio::null())
            .stdout(File::create(&stdout_path)?)
            .stderr(File::create(&stderr_path)?);
        limit_child(&mut command, job.niceness);

        let started = Instant::now();
        let status = self.wait(command, &executable)?;
        let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
        if !status.success() {
            tracing::warn!(%status, stderr = %stderr.trim(), "engine failed");
            return Err(Error::Model {
                message: format!("{} exited with {status}", executable.display()),
                stderr,
            });
        }

        let output = fs::read_to_string(&job.output).map_err(|e| Error::Model {
            message: format!("engine output {} unreadable: {e}", job.output.display()),
            stderr: stderr.clone(),
        })?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "engine finished");
        Ok(output)
    }

    /// Engine version string, from a separate `-v` invocation.
    pub fn version(&self) -> Result<String> {
        let executable = self.settings.executable_path();
        let output = Command::new(&executable)
            .arg("-v")
            .current_dir(&self.settings.home)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&executable, e))?;
        if !output.status.success() {
            return Err(Error::Model {
                message: format!("{} -v exited with {}", executable.display(), output.status),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn wait(&self, mut command: Command, executable: &Path) -> Result<ExitStatus> {
        let seconds = self.settings.timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(seconds);
        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(executable, e))?;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                kill(&mut child);
                tracing::warn!(seconds, "engine timed out");
                return Err(Error::Timeout { seconds });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_error(executable: &Path, e: io::Error) -> Error {
    Error::Model {
        message: format!("failed to start {}: {e}", executable.display()),
        stderr: String::new(),
    }
}

#[cfg(unix)]
fn limit_child(command: &mut Command, niceness: u32) {
    use std::os::unix::process::CommandExt;

    let niceness = niceness as libc::c_int;
    // SAFETY: the hook only calls async-signal-safe libc functions.
    unsafe {
        command.pre_exec(move || {
            raise_limits(niceness);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn limit_child(_command: &mut Command, _niceness: u32) {}

/// Lower the child's priority and lift its stack limit. Failures leave the
/// inherited settings in place.
#[cfg(unix)]
fn raise_limits(niceness: libc::c_int) {
    // SAFETY: plain syscalls on the current process with valid pointers.
    unsafe {
        libc::nice(niceness);
        let unlimited = libc::rlimit {
            rlim_cur: libc::RLIM_INFINITY,
            rlim_max: libc::RLIM_INFINITY,
        };
        if libc::setrlimit(libc::RLIMIT_STACK, &unlimited) != 0 {
            let mut current = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            if libc::getrlimit(libc::RLIMIT_STACK, &mut current) == 0 {
                current.rlim_cur = current.rlim_max;
                libc::setrlimit(libc::RLIMIT_STACK, &current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(options: EngineOptions) -> EngineJob {
        EngineJob {
            options,
            output: PathBuf::from("/tmp/w/FAM_main.out"),
            params: PathBuf::from("/tmp/w/FAM_main.params"),
            batch: PathBuf::from("/tmp/w/FAM_main.bat"),
            incidence: PathBuf::from("Data/incidences_UK.nml"),
            ethnicity: None,
            niceness: 0,
        }
    }

    #[test]
    fn arguments_follow_engine_cli() {
        let options = EngineOptions {
            carrier_probs: true,
            remaining_lifetime: true,
            lifetime: true,
            ..EngineOptions::default()
        };
        assert_eq!(options.flags(), vec!["-p", "-rl", "-rr"]);

        let mut job = job(options);
        job.ethnicity = Some(PathBuf::from("Data/ethnicity_UK-pop.nml"));
        assert_eq!(
            job.args(),
            vec![
                "-o",
                "/tmp/w/FAM_main.out",
                "-p",
                "-rl",
                "-rr",
                "-s",
                "/tmp/w/FAM_main.params",
                "-e",
                "Data/ethnicity_UK-pop.nml",
                "/tmp/w/FAM_main.bat",
                "Data/incidences_UK.nml",
            ]
        );
    }

    #[test]
    fn empty_options() {
        assert!(EngineOptions::default().is_empty());
        let ten = EngineOptions {
            ten_year: true,
            nhs_ten_year: true,
            ..EngineOptions::default()
        };
        assert_eq!(ten.flags(), vec!["-rj", "-ry"]);
    }

    #[test]
    fn missing_executable_is_a_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = crate::settings::Settings::default().bc;
        settings.home = dir.path().to_path_buf();
        settings.executable = "no-such-engine".into();
        let mut job = job(EngineOptions::default());
        job.output = dir.path().join("out.txt");
        let err = Engine::new(&settings).run(&job).unwrap_err();
        assert!(matches!(err, Error::Model { .. }));
    }
}
