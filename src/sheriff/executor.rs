//! Script validation and the cooperative dispatch loop (spec §4.5).

use super::{now_micros, Sheriff};
use crate::error::{Result, SheriffError};
use crate::event::Event;
use crate::model::{Action, Command, CommandStatus, IdentType, Script, SheriffId, WaitFor};

/// Throttle on [`Sheriff::check_wait_action_status`]: no more than 10
/// evaluations per second (spec §4.5, §9 "throttle heuristic" — tightly
/// coupled to event rate, keep it, dropping it produces live-lock).
const WAIT_CHECK_THROTTLE_US: u64 = 100_000;

/// One activation frame. A chain of these (via `subscript`) stands in for
/// the call stack a naive recursive implementation of `RunScript` would
/// need (spec §9, "linked frame chain").
#[derive(Debug, Clone)]
pub(crate) struct ScriptExecutionContext {
    script: Script,
    current_action: i64,
    subscript: Option<Box<ScriptExecutionContext>>,
}

impl ScriptExecutionContext {
    pub(crate) fn new(script: Script) -> Self {
        ScriptExecutionContext {
            script,
            current_action: -1,
            subscript: None,
        }
    }

    pub(crate) fn root_script_name(&self) -> &str {
        &self.script.name
    }

    /// Advances to the next dispatchable action, descending into
    /// `RunScript` frames transparently. Never returns a `RunScript`
    /// action itself.
    pub(crate) fn next_action(&mut self, resolve: &impl Fn(&str) -> Option<Script>) -> Option<Action> {
        loop {
            if let Some(sub) = self.subscript.as_mut() {
                if let Some(action) = sub.next_action(resolve) {
                    return Some(action);
                }
                self.subscript = None;
            }

            self.current_action += 1;
            if self.current_action as usize >= self.script.actions.len() {
                return None;
            }

            let action = self.script.actions[self.current_action as usize].clone();
            if let Action::RunScript(name) = &action {
                let sub_script = resolve(name)
                    .expect("RunScript target missing despite pre-execution validation");
                self.subscript = Some(Box::new(ScriptExecutionContext::new(sub_script)));
                continue;
            }
            return Some(action);
        }
    }
}

/// The outcome of one call to [`Sheriff::advance_script`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStep {
    /// No script is active.
    Idle,
    /// An action was dispatched. If `delay_ms` is `Some`, the caller must
    /// arm a one-shot timer before calling `advance_script` again;
    /// `None` means schedule the next call on the next event-loop tick.
    Dispatched { delay_ms: Option<u64> },
    /// A `wait_status` cohort is outstanding; re-entry happens from
    /// `Sheriff::check_wait_action_status` once the cohort settles, not
    /// from a direct caller loop.
    Waiting,
    /// The active script (and every nested frame) finished.
    Finished,
}

impl Sheriff {
    /// Begins running `name`, aborting whatever script is currently active
    /// first. Returns the validation errors without starting if any exist.
    pub fn execute_script(&mut self, name: &str) -> Result<()> {
        if self.active_script.is_some() {
            self.abort_script();
        }
        let errors = self.check_script_for_errors(name);
        if !errors.is_empty() {
            return Err(SheriffError::ScriptValidation(errors));
        }
        let script = self
            .get_script(name)
            .cloned()
            .expect("validated script must exist");
        self.active_script = Some(ScriptExecutionContext::new(script));
        self.waiting_on.clear();
        self.waiting_for = None;
        self.last_script_action_time_us = 0;
        self.script_generation += 1;
        self.emit(Event::ScriptStarted {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Stops the active script, if any, emitting `ScriptFinished` for it.
    pub fn abort_script(&mut self) {
        if let Some(ctx) = self.active_script.take() {
            self.emit(Event::ScriptFinished {
                name: ctx.root_script_name().to_string(),
            });
        }
        self.waiting_on.clear();
        self.waiting_for = None;
        self.script_generation += 1;
    }

    /// Drives the dispatch loop by one step (spec §4.5). The event loop
    /// calls this after each armed timer fires and once right after
    /// `execute_script` succeeds.
    pub fn advance_script(&mut self) -> DispatchStep {
        if self.active_script.is_none() {
            return DispatchStep::Idle;
        }
        if self.waiting_for.is_some() {
            return DispatchStep::Waiting;
        }

        let mut ctx = self.active_script.take().expect("checked above");
        let action = {
            let scripts = &self.scripts;
            ctx.next_action(&|name| scripts.iter().find(|s| s.name == name).cloned())
        };

        let Some(action) = action else {
            self.emit(Event::ScriptFinished {
                name: ctx.root_script_name().to_string(),
            });
            return DispatchStep::Finished;
        };

        debug_assert!(
            !matches!(action, Action::RunScript(_)),
            "RunScript must never reach the dispatcher"
        );

        let script_name = ctx.root_script_name().to_string();
        self.active_script = Some(ctx);
        self.emit(Event::ScriptActionExecuting {
            script: script_name,
            action: action.clone(),
        });

        match action {
            Action::WaitMs(delay) => DispatchStep::Dispatched {
                delay_ms: Some(delay),
            },
            Action::Start { ident_type, ident, wait } => {
                self.dispatch_mutation(ident_type, ident.as_deref(), wait, Command::start)
            }
            Action::Stop { ident_type, ident, wait } => {
                self.dispatch_mutation(ident_type, ident.as_deref(), wait, Command::stop)
            }
            Action::Restart { ident_type, ident, wait } => {
                self.dispatch_mutation(ident_type, ident.as_deref(), wait, Command::restart)
            }
            Action::WaitStatus { ident_type, ident, wait } => {
                let ids = self.resolve_idents(ident_type, Some(&ident));
                self.begin_wait(ids, wait)
            }
            Action::RunScript(_) => unreachable!("filtered out by ScriptExecutionContext::next_action"),
        }
    }

    fn dispatch_mutation(
        &mut self,
        ident_type: IdentType,
        ident: Option<&str>,
        wait: Option<WaitFor>,
        mutate: fn(&mut Command),
    ) -> DispatchStep {
        let ids = self.resolve_idents(ident_type, ident);
        for id in &ids {
            if let Some(cmd) = self.command_mut(*id) {
                mutate(cmd);
            }
        }
        self.last_script_action_time_us = now_micros();
        match wait {
            Some(wait_for) => self.begin_wait(ids, wait_for),
            None => DispatchStep::Dispatched { delay_ms: None },
        }
    }

    fn resolve_idents(&self, ident_type: IdentType, ident: Option<&str>) -> Vec<SheriffId> {
        match ident_type {
            IdentType::Everything => self.all_commands().into_iter().map(|c| c.sheriff_id).collect(),
            IdentType::Cmd => self
                .commands_by_nickname(ident.unwrap_or_default())
                .into_iter()
                .map(|c| c.sheriff_id)
                .collect(),
            IdentType::Group => self
                .commands_by_group(ident.unwrap_or_default())
                .into_iter()
                .map(|c| c.sheriff_id)
                .collect(),
        }
    }

    fn begin_wait(&mut self, ids: Vec<SheriffId>, wait_for: WaitFor) -> DispatchStep {
        if ids.is_empty() {
            return DispatchStep::Dispatched { delay_ms: None };
        }
        self.waiting_on = ids;
        self.waiting_for = Some(wait_for);
        self.check_wait_action_status();
        if self.waiting_for.is_none() {
            DispatchStep::Dispatched { delay_ms: None }
        } else {
            DispatchStep::Waiting
        }
    }

    /// Re-checks the outstanding wait cohort. Called from the mutators'
    /// status-change fan-out as well as from `begin_wait` (spec §4.5).
    pub(crate) fn check_wait_action_status(&mut self) {
        let Some(wait_for) = self.waiting_for else {
            return;
        };
        if self.waiting_on.is_empty() {
            return;
        }
        let now = now_micros();
        if self.last_script_action_time_us != 0
            && now.saturating_sub(self.last_script_action_time_us) < WAIT_CHECK_THROTTLE_US
        {
            return;
        }

        let acceptable: &[CommandStatus] = match wait_for {
            WaitFor::Running => &[CommandStatus::Running],
            WaitFor::Stopped => &[CommandStatus::StoppedOk, CommandStatus::StoppedError],
        };
        let all_ready = self.waiting_on.iter().all(|id| {
            self.command(*id)
                .map(|c| acceptable.contains(&c.status()))
                .unwrap_or(true)
        });
        if all_ready {
            self.waiting_on.clear();
            self.waiting_for = None;
        }
    }

    /// Walks `name` and its transitive `run_script` targets, accumulating
    /// errors rather than stopping at the first one (spec §4.5).
    pub fn check_script_for_errors(&self, name: &str) -> Vec<String> {
        let mut errors = Vec::new();
        match self.get_script(name).cloned() {
            Some(script) => {
                let mut path = vec![name.to_string()];
                self.validate_script(&script, &mut path, &mut errors);
            }
            None => errors.push(format!("Unknown script \"{name}\"")),
        }
        errors
    }

    fn validate_script(&self, script: &Script, path: &mut Vec<String>, errors: &mut Vec<String>) {
        for action in &script.actions {
            match action {
                Action::Start { ident_type, ident, .. }
                | Action::Stop { ident_type, ident, .. }
                | Action::Restart { ident_type, ident, .. } => {
                    self.validate_ident(*ident_type, ident.as_deref(), errors);
                }
                Action::WaitStatus { ident_type, ident, .. } => {
                    self.validate_ident(*ident_type, Some(ident.as_str()), errors);
                }
                Action::WaitMs(_) => {}
                Action::RunScript(name) => {
                    if path.contains(name) {
                        errors.push(format!(
                            "Infinite loop: script {name} eventually calls itself"
                        ));
                        continue;
                    }
                    match self.get_script(name).cloned() {
                        Some(sub) => {
                            path.push(name.clone());
                            self.validate_script(&sub, path, errors);
                            path.pop();
                        }
                        None => errors.push(format!("Unknown script \"{name}\"")),
                    }
                }
            }
        }
    }

    fn validate_ident(&self, ident_type: IdentType, ident: Option<&str>, errors: &mut Vec<String>) {
        match ident_type {
            IdentType::Everything => {}
            IdentType::Cmd => {
                let name = ident.unwrap_or_default();
                if self.commands_by_nickname(name).is_empty() {
                    errors.push(format!("Unknown command nickname \"{name}\""));
                }
            }
            IdentType::Group => {
                let name = ident.unwrap_or_default();
                if self.commands_by_group(name).is_empty() {
                    errors.push(format!("Unknown group \"{name}\""));
                }
            }
        }
    }
}
