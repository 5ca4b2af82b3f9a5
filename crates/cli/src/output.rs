//! Event rendering
//!
//! Text output follows the transcript format of the simulator: one line per
//! read, write, commit and abort, and a block per dump.

use repdb_engine::{AbortReason, DumpReport, Event, SiteDump, WaitTarget, WriteScope};
use std::fmt;

/// Human-readable rendering of one event, possibly spanning several lines
pub struct TextEvent<'a>(pub &'a Event);

impl fmt::Display for TextEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Event::Read {
                txn,
                variable,
                value,
            } => write!(f, "{} read {}: {}", txn, variable, value),
            Event::Wrote {
                txn,
                variable,
                value,
                scope: WriteScope::AllSites,
            } => write!(f, "{} wrote to {} to all sites: {}", txn, variable, value),
            Event::Wrote {
                txn,
                variable,
                value,
                scope: WriteScope::Site(site),
            } => write!(f, "{} wrote to {} at Site {}: {}", txn, variable, site, value),
            Event::Waiting { txn, variable, on } => match on {
                WaitTarget::Lock { blockers } => write!(
                    f,
                    "{} waits for lock on {} (held by {})",
                    txn,
                    variable,
                    join(blockers)
                ),
                WaitTarget::Sites { sites } if sites.len() == 1 => {
                    write!(f, "{} waits for site {} to access {}", txn, join(sites), variable)
                }
                WaitTarget::Sites { sites } => {
                    write!(f, "{} waits for sites {} to access {}", txn, join(sites), variable)
                }
            },
            Event::Committed { txn, writes } => {
                for write in writes {
                    match write.scope {
                        WriteScope::AllSites => writeln!(
                            f,
                            "{} committed {} to all available sites: {}",
                            txn, write.variable, write.value
                        )?,
                        WriteScope::Site(site) => writeln!(
                            f,
                            "{} committed {} to Site {}: {}",
                            txn, write.variable, site, write.value
                        )?,
                    }
                }
                write!(f, "{} committed", txn)
            }
            Event::Aborted { txn, reason } => match reason {
                AbortReason::Deadlock { variable } => {
                    write!(f, "{} ABORTED due to attempted lock on variable {}", txn, variable)
                }
                AbortReason::SiteFailure { site } => {
                    write!(f, "{} ABORTED because Site {} has failed", txn, site)
                }
                AbortReason::NoConsistentSnapshot { variable } => write!(
                    f,
                    "{} ABORTED because no site holds a consistent snapshot of {}",
                    txn, variable
                ),
            },
            Event::SiteFailed { site } => write!(f, "Site {} failed", site),
            Event::SiteRecovered { site } => write!(f, "Site {} recovered", site),
            Event::Dump(report) => write_dump(f, report),
        }
    }
}

fn write_dump(f: &mut fmt::Formatter<'_>, report: &DumpReport) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "=== output of dump ===")?;
    match report {
        DumpReport::Sites(sites) => {
            for (i, site) in sites.iter().enumerate() {
                if i > 0 {
                    write!(f, "\n\n")?;
                }
                write_site(f, site)?;
            }
            Ok(())
        }
        DumpReport::Variable { variable, values } => {
            write!(f, "{}", variable)?;
            for (site, value) in values {
                write!(f, "\nSite {}: {}", site, value)?;
            }
            Ok(())
        }
    }
}

fn write_site(f: &mut fmt::Formatter<'_>, dump: &SiteDump) -> fmt::Result {
    write!(f, "Site {}", dump.site)?;
    for (variable, value) in &dump.committed {
        write!(f, "\n{}: {}", variable, value)?;
    }
    if dump.has_initial_values {
        write!(f, "\nAll other variables have their initial values")?;
    }
    Ok(())
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One JSON object per event
pub fn json_line(event: &Event) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
