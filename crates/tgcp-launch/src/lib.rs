//! Launcher: run an interpreter from a virtual environment next to the launcher.
//!
//! The launcher resolves the directory it really lives in (following symlinks),
//! changes into it, and replaces itself with `<dir>/.venv/bin/python main.py`.
//! Arguments given to the launcher are not forwarded.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    process::Command,
};

pub const DEFAULT_INTERPRETER: &str = ".venv/bin/python";
pub const DEFAULT_SCRIPT: &str = "main.py";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot locate the running executable: {0}")]
    Locate(#[source] io::Error),

    #[error("cannot resolve {path}: {source}")]
    Resolve { path: PathBuf, source: io::Error },

    #[error("{0} has no parent directory")]
    NoParent(PathBuf),

    #[error("cannot change directory to {path}: {source}")]
    ChangeDir { path: PathBuf, source: io::Error },

    #[error("interpreter not found: {0}")]
    InterpreterNotFound(PathBuf),

    #[error("interpreter is not an executable file: {0}")]
    NotExecutable(PathBuf),

    #[error("failed to execute {path}: {source}")]
    Exec { path: PathBuf, source: io::Error },
}

impl LaunchError {
    /// Shell-style exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::InterpreterNotFound(_) => 127,
            LaunchError::NotExecutable(_) => 126,
            LaunchError::Exec { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}

/// Directory containing the real file behind `invoked` (symlinks resolved).
pub fn resolve_home(invoked: &Path) -> Result<PathBuf, LaunchError> {
    let real = fs::canonicalize(invoked).map_err(|source| LaunchError::Resolve {
        path: invoked.to_path_buf(),
        source,
    })?;
    match real.parent() {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Err(LaunchError::NoParent(real.clone())),
    }
}

/// Directory of the running executable.
pub fn current_home() -> Result<PathBuf, LaunchError> {
    let exe = env::current_exe().map_err(LaunchError::Locate)?;
    resolve_home(&exe)
}

/// Resolve the executable's directory and make it the working directory.
pub fn enter_home() -> Result<PathBuf, LaunchError> {
    let home = current_home()?;
    env::set_current_dir(&home).map_err(|source| LaunchError::ChangeDir {
        path: home.clone(),
        source,
    })?;
    Ok(home)
}

#[derive(Clone, Debug)]
pub struct Launcher {
    home: PathBuf,
    interpreter: PathBuf,
    script: PathBuf,
}

impl Launcher {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self::with_target(home, DEFAULT_INTERPRETER, DEFAULT_SCRIPT)
    }

    pub fn with_target(
        home: impl Into<PathBuf>,
        interpreter: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            home: home.into(),
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn interpreter_path(&self) -> PathBuf {
        self.home.join(&self.interpreter)
    }

    /// The interpreter must be an executable file. The script is not checked;
    /// a missing script is reported by the interpreter itself.
    pub fn preflight(&self) -> Result<(), LaunchError> {
        let path = self.interpreter_path();
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LaunchError::InterpreterNotFound(path));
            }
            Err(source) => return Err(LaunchError::Exec { path, source }),
        };

        if !metadata.is_file() {
            return Err(LaunchError::NotExecutable(path));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(LaunchError::NotExecutable(path));
            }
        }

        Ok(())
    }

    /// `<home>/<interpreter> <script>`, run from `home`.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.interpreter_path());
        cmd.arg(&self.script).current_dir(&self.home);
        cmd
    }

    /// Replace the current process with the interpreter.
    ///
    /// Only returns on failure. Without process replacement (non-Unix) the child
    /// is awaited and its status becomes ours.
    pub fn exec(&self) -> LaunchError {
        if let Err(e) = self.preflight() {
            return e;
        }

        #[cfg(unix)]
        let source = {
            use std::os::unix::process::CommandExt;
            self.command().exec()
        };

        #[cfg(not(unix))]
        let source = match self.command().status() {
            Ok(status) => std::process::exit(status.code().unwrap_or(1)),
            Err(e) => e,
        };

        LaunchError::Exec {
            path: self.interpreter_path(),
            source,
        }
    }
}

/// Enter the launcher's directory and exec the default target.
pub fn run() -> LaunchError {
    match enter_home() {
        Ok(home) => Launcher::new(home).exec(),
        Err(e) => e,
    }
}
