//! The implementation of the `YKSPLICE_LOG` and `YKSPLICE_LOG_IR` environment variables.
//!
//! Nothing here is global: a [Log] is created (normally once, by whoever drives the splicer, via
//! [Log::new]) and handed to a [crate::Splicer].

use std::{collections::HashSet, env, error::Error, fs::File, io::Write, path::PathBuf};
use strum::{EnumCount, FromRepr};

/// How verbose should normal logging be?
#[repr(u8)]
#[derive(Copy, Clone, Debug, EnumCount, FromRepr, PartialEq, PartialOrd)]
pub enum Verbosity {
    /// Disable logging entirely.
    Disabled,
    /// Log errors.
    Error,
    /// Log warnings.
    Warning,
    /// Log splicing events (e.g. which labels a splice introduced).
    SpliceEvent,
}

/// The points at which the IR can be dumped with `YKSPLICE_LOG_IR`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IRPhase {
    /// The trace, after its guards have been rebound.
    Trace,
    /// The target function before splicing.
    PreSplice,
    /// The target function after splicing.
    PostSplice,
}

impl IRPhase {
    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "trace" => Ok(Self::Trace),
            "pre-splice" => Ok(Self::PreSplice),
            "post-splice" => Ok(Self::PostSplice),
            _ => Err(format!("Invalid YKSPLICE_LOG_IR value: {s}").into()),
        }
    }
}

pub struct Log {
    /// The requested [Verbosity] level for logging.
    level: Verbosity,
    /// The path to write to. A value of `None` means stderr.
    path: Option<PathBuf>,
    /// Where to dump IR to (`None` means stderr) and at which phases. If `None`, IR is never
    /// dumped.
    ir: Option<(Option<PathBuf>, HashSet<IRPhase>)>,
}

impl Log {
    /// Create a [Log] from the `YKSPLICE_LOG` and `YKSPLICE_LOG_IR` environment variables.
    pub fn new() -> Result<Self, Box<dyn Error>> {
        Self::from_spec(
            env::var("YKSPLICE_LOG").ok().as_deref(),
            env::var("YKSPLICE_LOG_IR").ok().as_deref(),
        )
    }

    /// Create a [Log] from values in the format of `YKSPLICE_LOG` (`[<path|->:]<level>`) and
    /// `YKSPLICE_LOG_IR` (`[<path|->:]<phase_1>[,...,<phase_n>]`). If `log` is `None`, errors are
    /// logged to stderr; if `log_ir` is `None`, no IR is logged.
    pub fn from_spec(log: Option<&str>, log_ir: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let (path, level) = match log {
            Some(s) => {
                let (path, level) = match s.split(':').collect::<Vec<_>>()[..] {
                    [path, level] => (open_path(path), level),
                    [level] => (None, level),
                    [..] => {
                        return Err("YKSPLICE_LOG must be of the format `[<path|->:]<level>`".into())
                    }
                };
                let level = level
                    .parse::<u8>()
                    .map_err(|e| format!("Invalid YKSPLICE_LOG level '{s}': {e}"))?;
                let max_level = Verbosity::COUNT - 1;
                let level = Verbosity::from_repr(level).ok_or_else(|| {
                    format!("YKSPLICE_LOG level {level} exceeds maximum {max_level}")
                })?;
                (path, level)
            }
            None => (None, Verbosity::Error),
        };

        let ir = match log_ir {
            Some(s) => {
                let (path, phases) = match s.split(':').collect::<Vec<_>>()[..] {
                    [path, phases] => (open_path(path), phases),
                    [phases] => (None, phases),
                    [..] => {
                        return Err("YKSPLICE_LOG_IR must be of the format '[<path|->:]<phase_1>[,...,<phase_n>]'".into())
                    }
                };
                let phases = phases
                    .split(',')
                    .map(IRPhase::from_str)
                    .collect::<Result<HashSet<_>, _>>()?;
                Some((path, phases))
            }
            None => None,
        };

        Ok(Self { level, path, ir })
    }

    /// A [Log] which never logs anything.
    pub fn disabled() -> Self {
        Self {
            level: Verbosity::Disabled,
            path: None,
            ir: None,
        }
    }

    /// Log `msg` with the [Verbosity] level `level`.
    ///
    /// # Panics
    ///
    /// If `level == Verbosity::Disabled`.
    pub fn log(&self, level: Verbosity, msg: &str) {
        if level <= self.level {
            let prefix = match level {
                Verbosity::Disabled => panic!(),
                Verbosity::Error => "yksplice-error",
                Verbosity::Warning => "yksplice-warning",
                Verbosity::SpliceEvent => "yksplice-event",
            };
            write_to(self.path.as_ref(), &format!("{prefix}: {msg}\n"));
        }
    }

    /// Should IR be logged at `phase`? Callers should check this before building the string to
    /// pass to [Self::log_ir].
    pub fn should_log_ir(&self, phase: IRPhase) -> bool {
        matches!(&self.ir, Some((_, phases)) if phases.contains(&phase))
    }

    pub fn log_ir(&self, s: &str) {
        if let Some((path, _)) = &self.ir {
            write_to(path.as_ref(), s);
        }
    }
}

/// Convert a log path to `None` (meaning stderr) if it is `-`. Otherwise, if there's an existing
/// log file, truncate (i.e. empty it), so that later appends to the log aren't appending to a
/// previous log run.
fn open_path(path: &str) -> Option<PathBuf> {
    if path == "-" {
        None
    } else {
        let path = PathBuf::from(path);
        File::create(&path).ok();
        Some(path)
    }
}

fn write_to(path: Option<&PathBuf>, s: &str) {
    match path {
        Some(p) => {
            File::options()
                .append(true)
                .open(p)
                .map(|mut x| x.write_all(s.as_bytes()))
                .ok();
        }
        None => eprint!("{s}"),
    }
}
