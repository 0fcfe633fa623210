use super::{PotentialError, tail_lines};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, trace};

/// Directory in which an external program is run.
#[derive(Debug)]
pub enum WorkDir {
    /// A user-chosen directory, kept after the run.
    Fixed(PathBuf),
    /// A scratch directory removed on drop.
    Temporary(TempDir),
}

impl WorkDir {
    /// Uses `dir` (created if missing) or a fresh temporary directory.
    pub fn new(dir: Option<&Path>, prefix: &str) -> Result<Self, PotentialError> {
        match dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(Self::Fixed(dir.to_path_buf()))
            }
            None => Ok(Self::Temporary(
                tempfile::Builder::new().prefix(prefix).tempdir()?,
            )),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Fixed(path) => path,
            Self::Temporary(dir) => dir.path(),
        }
    }
}

/// Runs `command_line` through `sh -c` inside `dir`, blocking until it exits.
///
/// Standard input is read from `stdin` and standard output written to
/// `stdout` when given, both relative to `dir`. A non-zero exit status is
/// reported as [`PotentialError::SolverFailed`] with the tail of the output.
pub fn run_shell(
    program: &str,
    command_line: &str,
    dir: &Path,
    stdin: Option<&str>,
    stdout: Option<&str>,
) -> Result<(), PotentialError> {
    debug!("Running {} in {:?}: {}", program, dir, command_line);

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(command_line)
        .current_dir(dir)
        .stderr(Stdio::piped());
    command.stdin(match stdin {
        Some(name) => Stdio::from(File::open(dir.join(name))?),
        None => Stdio::null(),
    });
    command.stdout(match stdout {
        Some(name) => Stdio::from(File::create(dir.join(name))?),
        None => Stdio::piped(),
    });

    let output = command.output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        trace!("{} stderr:\n{}", program, stderr);
    }

    if !output.status.success() {
        let stdout_text = match stdout {
            Some(name) => fs::read_to_string(dir.join(name)).unwrap_or_default(),
            None => String::from_utf8_lossy(&output.stdout).into_owned(),
        };
        let combined = format!("{}{}", stdout_text, stderr);
        return Err(PotentialError::SolverFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            output_tail: tail_lines(&combined, 20),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn fixed_work_dir_is_created_and_kept() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested/run");
        let work = WorkDir::new(Some(&dir), "x").unwrap();
        assert_eq!(work.path(), dir.as_path());
        drop(work);
        assert!(dir.is_dir());
    }

    #[test]
    fn temporary_work_dir_is_removed_on_drop() {
        let work = WorkDir::new(None, "potscan-test").unwrap();
        let path = work.path().to_path_buf();
        assert!(path.is_dir());
        drop(work);
        assert!(!path.exists());
    }

    #[test]
    fn run_shell_redirects_stdin_and_stdout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("in.txt"), "hello\n").unwrap();
        run_shell("cat", "cat", dir.path(), Some("in.txt"), Some("out.txt")).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn run_shell_reports_failure_with_output_tail() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_shell(
            "solver",
            "echo 'line one'; echo 'boom' >&2; exit 3",
            dir.path(),
            None,
            Some("solver.out"),
        );
        match result {
            Err(PotentialError::SolverFailed {
                program,
                output_tail,
                ..
            }) => {
                assert_eq!(program, "solver");
                assert!(output_tail.contains("line one"));
                assert!(output_tail.contains("boom"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
