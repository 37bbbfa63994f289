//! Sample databases for tests.
//!
//! The dependency database knows `ALARM:R3-7`, `ALARM:R3-8` and `MCAN:R2-6`,
//! plus a small chain `MYAPP -> ALARM`, `MYAPP -> MCAN`. The build database
//! has `MYAPP-001` (state `testing`) holding `ALARM:R3-7` and `MCAN:R2-6`,
//! and `MYAPP-002` which reuses `MCAN` from `MYAPP-001`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::util::context::{BUILDS_FILE_NAME, DEPS_FILE_NAME};

/// Dependency database in its persisted form.
pub const DEPS_JSON: &str = r#"{
    "ALARM": {
        "R3-7": {
            "source": {
                "git": {
                    "tag": "R3-7",
                    "url": "https://git.example.org/alarm.git"
                }
            }
        },
        "R3-8": {
            "source": {
                "git": {
                    "tag": "R3-8",
                    "url": "https://git.example.org/alarm.git"
                }
            },
            "weight": 1
        }
    },
    "MCAN": {
        "R2-6": {
            "source": {
                "path": "/srv/modules/mcan/R2-6"
            }
        }
    },
    "MYAPP": {
        "R1-0": {
            "aliases": {
                "MCAN": "CAN"
            },
            "dependencies": [
                "ALARM",
                "MCAN"
            ],
            "source": {
                "path": "/srv/modules/myapp/R1-0"
            }
        }
    }
}
"#;

/// Build database in its persisted form.
pub const BUILDS_JSON: &str = r#"{
    "MYAPP-001": {
        "modules": {
            "ALARM": "R3-7",
            "MCAN": "R2-6"
        },
        "state": "testing"
    },
    "MYAPP-002": {
        "linked": {
            "MCAN": "MYAPP-001"
        },
        "modules": {
            "ALARM": "R3-8",
            "MCAN": "R2-6",
            "MYAPP": "R1-0"
        },
        "state": "stable"
    }
}
"#;

/// A build file meant to be layered on top of [`BUILDS_JSON`].
pub const OVERLAY_BUILDS_JSON: &str = r#"{
    "SHARED-001": {
        "modules": {
            "ALARM": "R3-7"
        },
        "state": "stable"
    }
}
"#;

/// Write both sample databases into `dir`, returning their paths.
pub fn write_sample_dbs(dir: &Path) -> (PathBuf, PathBuf) {
    let deps = dir.join(DEPS_FILE_NAME);
    let builds = dir.join(BUILDS_FILE_NAME);
    fs::write(&deps, DEPS_JSON).unwrap();
    fs::write(&builds, BUILDS_JSON).unwrap();
    (deps, builds)
}
