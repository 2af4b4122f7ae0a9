// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! In-memory host for tests: records commands and simulates systemd and nftables

use crate::error::Result;
use crate::host::{CommandOutput, Host};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitState {
    pub enabled: bool,
    pub active: bool,
}

#[derive(Debug, Default)]
struct Inner {
    units: BTreeMap<String, UnitState>,
    nft_tables: BTreeSet<(String, String)>,
    failures: Vec<(String, String)>,
    calls: Vec<String>,
}

#[derive(Debug)]
pub struct FakeHost {
    machine: String,
    kernel_release: String,
    inner: RefCell<Inner>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self::with_machine("x86_64")
    }

    pub fn with_machine(machine: &str) -> Self {
        Self {
            machine: machine.to_string(),
            kernel_release: "6.1.0-18-amd64".to_string(),
            inner: RefCell::new(Inner::default()),
        }
    }

    pub fn add_unit(&self, name: &str, enabled: bool, active: bool) {
        self.inner
            .borrow_mut()
            .units
            .insert(name.to_string(), UnitState { enabled, active });
    }

    pub fn add_nft_table(&self, family: &str, name: &str) {
        self.inner
            .borrow_mut()
            .nft_tables
            .insert((family.to_string(), name.to_string()));
    }

    /// Make every call to `program` whose arguments include `arg` fail.
    pub fn fail(&self, program: &str, arg: &str) {
        self.inner
            .borrow_mut()
            .failures
            .push((program.to_string(), arg.to_string()));
    }

    pub fn clear_failures(&self) {
        self.inner.borrow_mut().failures.clear();
    }

    pub fn unit(&self, name: &str) -> Option<UnitState> {
        self.inner.borrow().units.get(name).copied()
    }

    pub fn enabled_units(&self) -> BTreeSet<String> {
        self.units_where(|s| s.enabled)
    }

    pub fn active_units(&self) -> BTreeSet<String> {
        self.units_where(|s| s.active)
    }

    fn units_where(&self, pred: impl Fn(&UnitState) -> bool) -> BTreeSet<String> {
        self.inner
            .borrow()
            .units
            .iter()
            .filter(|(_, state)| pred(state))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn nft_tables(&self) -> BTreeSet<(String, String)> {
        self.inner.borrow().nft_tables.clone()
    }

    /// Every command run so far, as `program arg arg...`
    pub fn calls(&self) -> Vec<String> {
        self.inner.borrow().calls.clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<String> {
        let prefix = format!("{program} ");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix) || c == program)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    fn systemctl(inner: &mut Inner, args: &[&str]) -> CommandOutput {
        let positional: Vec<&str> = args
            .iter()
            .copied()
            .filter(|a| !a.starts_with("--"))
            .collect();
        let Some((&action, targets)) = positional.split_first() else {
            return failure("no action");
        };

        match action {
            "is-active" => {
                let active = targets
                    .iter()
                    .all(|t| inner.units.get(*t).is_some_and(|s| s.active));
                outcome(active)
            }
            "start" | "restart" => {
                for target in targets {
                    inner.units.entry((*target).to_string()).or_default().active = true;
                }
                outcome(true)
            }
            "enable" => {
                for target in targets {
                    inner.units.entry((*target).to_string()).or_default().enabled = true;
                }
                outcome(true)
            }
            "stop" | "disable" => {
                let mut matched = true;
                for target in targets {
                    let names = matching(&inner.units, target);
                    if names.is_empty() && !target.contains('*') {
                        matched = false;
                    }
                    for name in names {
                        if let Some(state) = inner.units.get_mut(&name) {
                            if action == "stop" {
                                state.active = false;
                            } else {
                                state.enabled = false;
                            }
                        }
                    }
                }
                if matched {
                    outcome(true)
                } else {
                    failure("Unit not loaded.")
                }
            }
            "daemon-reload" => outcome(true),
            "list-units" | "list-unit-files" => {
                let pattern = targets.last().copied().unwrap_or("*");
                let stdout = matching(&inner.units, pattern)
                    .into_iter()
                    .map(|name| {
                        let state = inner.units.get(&name).copied().unwrap_or_default();
                        if action == "list-units" {
                            let active = if state.active { "active" } else { "inactive" };
                            format!("{name} loaded {active} running\n")
                        } else {
                            let enabled = if state.enabled { "enabled" } else { "disabled" };
                            format!("{name} {enabled} enabled\n")
                        }
                    })
                    .collect();
                CommandOutput {
                    success: true,
                    stdout,
                    stderr: String::new(),
                }
            }
            _ => failure("unknown action"),
        }
    }

    fn nft(inner: &mut Inner, args: &[&str]) -> CommandOutput {
        match args {
            ["delete", "table", family, name] => {
                let key = ((*family).to_string(), (*name).to_string());
                if inner.nft_tables.remove(&key) {
                    outcome(true)
                } else {
                    failure("Error: No such file or directory")
                }
            }
            _ => outcome(true),
        }
    }
}

fn matching(units: &BTreeMap<String, UnitState>, pattern: &str) -> Vec<String> {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => units
            .keys()
            .filter(|name| name.starts_with(prefix) && name.ends_with(suffix))
            .cloned()
            .collect(),
        None => units
            .keys()
            .filter(|name| name.as_str() == pattern)
            .cloned()
            .collect(),
    }
}

fn outcome(success: bool) -> CommandOutput {
    CommandOutput {
        success,
        ..Default::default()
    }
}

fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl Host for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(if args.is_empty() {
            program.to_string()
        } else {
            format!("{program} {}", args.join(" "))
        });

        let injected = inner
            .failures
            .iter()
            .any(|(p, a)| p == program && args.contains(&a.as_str()));
        if injected {
            return Ok(failure("simulated failure"));
        }

        Ok(match program {
            "systemctl" => Self::systemctl(&mut inner, args),
            "nft" => Self::nft(&mut inner, args),
            _ => outcome(true),
        })
    }

    fn machine(&self) -> Result<String> {
        Ok(self.machine.clone())
    }

    fn kernel_release(&self) -> Result<String> {
        Ok(self.kernel_release.clone())
    }
}
