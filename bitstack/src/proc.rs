// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative proc scheduling.
//!
//! A proc is compiled into a `config` function (spawn-time wiring, run once)
//! and a `next` function (one step, run repeatedly). The VM core reports
//! `recv` on an empty channel as an unavailable outcome instead of blocking;
//! this module supplies the driver that retries such procs.
//!
//! [`Scheduler`] runs `next` activations round-robin within one logical
//! thread. A proc whose step completes has its state replaced by the step's
//! result; a proc that reports unavailable keeps its previous state and is
//! retried on the following pass. A full pass in which every proc is blocked
//! means no send can ever unblock anyone again, and the run stops.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::bytecode::BytecodeFunction;
use crate::program::ImportData;
use crate::value::Value;
use crate::vm::{ErrorKind, Interpreter, Limits, VmError};

/// A compiled proc: spawn-time wiring plus the repeated step.
#[derive(Clone)]
pub struct ProcDef {
    /// Proc name, for diagnostics.
    pub name: String,
    /// Spawn-time wiring; its result becomes the initial step state.
    pub config: Rc<BytecodeFunction>,
    /// One step; receives the state tuple and returns the next state.
    pub next: Rc<BytecodeFunction>,
}

struct ProcInstance {
    def: ProcDef,
    state: Vec<Value>,
}

/// Outcome of [`Scheduler::run_until_blocked`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// A full pass made no progress; every proc is waiting on an empty
    /// channel.
    AllBlocked,
    /// The pass budget ran out with procs still making progress.
    PassBudgetExhausted,
}

/// A round-robin driver for proc `next` activations.
pub struct Scheduler<'a> {
    import_data: &'a ImportData,
    limits: Limits,
    procs: Vec<ProcInstance>,
}

impl<'a> Scheduler<'a> {
    /// An empty scheduler over `import_data`.
    #[must_use]
    pub fn new(import_data: &'a ImportData, limits: Limits) -> Self {
        Self {
            import_data,
            limits,
            procs: Vec::new(),
        }
    }

    /// Spawns `def`, running its `config` immediately with `config_args`.
    ///
    /// The config result becomes the proc's step state: a tuple is spread
    /// into one slot per element, any other value occupies slot 0 alone.
    pub fn spawn(&mut self, def: ProcDef, config_args: Vec<Value>) -> Result<(), VmError> {
        let mut interp = Interpreter::new(self.import_data, self.limits.clone());
        let result = interp.run(&def.config, config_args)?;
        let state = match result {
            Value::Tuple(elements) => elements,
            other => vec![other],
        };
        self.procs.push(ProcInstance { def, state });
        Ok(())
    }

    /// Number of spawned procs.
    #[must_use]
    pub fn proc_count(&self) -> usize {
        self.procs.len()
    }

    /// The current step state of the proc named `name`.
    #[must_use]
    pub fn state_of(&self, name: &str) -> Option<&[Value]> {
        self.procs
            .iter()
            .find(|p| p.def.name == name)
            .map(|p| p.state.as_slice())
    }

    /// Runs one round-robin pass; returns the number of procs that
    /// completed a step.
    ///
    /// Unavailable steps leave the proc's state untouched; any other error
    /// aborts the pass.
    pub fn tick(&mut self) -> Result<usize, VmError> {
        let mut ran = 0;
        for proc in &mut self.procs {
            let mut interp = Interpreter::new(self.import_data, self.limits.clone());
            match interp.run(&proc.def.next, proc.state.clone()) {
                Ok(result) => {
                    proc.state = match result {
                        Value::Tuple(elements) => elements,
                        other => vec![other],
                    };
                    ran += 1;
                }
                Err(e) if e.kind() == ErrorKind::Unavailable => {}
                Err(e) => return Err(e),
            }
        }
        Ok(ran)
    }

    /// Ticks until every proc blocks in the same pass, or `max_passes`
    /// elapse.
    pub fn run_until_blocked(&mut self, max_passes: usize) -> Result<RunOutcome, VmError> {
        for _ in 0..max_passes {
            if self.tick()? == 0 {
                return Ok(RunOutcome::AllBlocked);
            }
        }
        Ok(RunOutcome::PassBudgetExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::bytecode::SlotIndex;
    use crate::channel::ChannelRef;

    /// config: () -> (ch, 0); next: (ch, i) -> send i, state (ch, i + 1).
    fn producer(ch: &ChannelRef) -> ProcDef {
        let mut config = Asm::new();
        config.literal(Value::Channel(ch.clone()));
        config.literal(Value::u32_value(0));
        config.create_tuple(2);

        let mut next = Asm::new();
        next.load(SlotIndex(0));
        next.load(SlotIndex(1));
        next.send();
        next.load(SlotIndex(0));
        next.load(SlotIndex(1));
        next.literal(Value::u32_value(1));
        next.add();
        next.create_tuple(2);

        ProcDef {
            name: String::from("producer"),
            config: config.build(None, None, None).unwrap(),
            next: next.build(None, None, None).unwrap(),
        }
    }

    /// config: () -> (ch, 0); next: (ch, acc) -> state (ch, acc + recv).
    fn consumer(ch: &ChannelRef) -> ProcDef {
        let mut config = Asm::new();
        config.literal(Value::Channel(ch.clone()));
        config.literal(Value::u32_value(0));
        config.create_tuple(2);

        let mut next = Asm::new();
        next.load(SlotIndex(0));
        next.load(SlotIndex(0));
        next.recv();
        next.load(SlotIndex(1));
        next.add();
        next.create_tuple(2);

        ProcDef {
            name: String::from("consumer"),
            config: config.build(None, None, None).unwrap(),
            next: next.build(None, None, None).unwrap(),
        }
    }

    #[test]
    fn producer_consumer_make_progress() {
        let import_data = ImportData::new();
        let ch = ChannelRef::new();
        let mut sched = Scheduler::new(&import_data, Limits::default());
        sched.spawn(producer(&ch), vec![]).unwrap();
        sched.spawn(consumer(&ch), vec![]).unwrap();
        assert_eq!(sched.proc_count(), 2);

        // Each pass: producer sends i, consumer folds it in.
        for _ in 0..3 {
            assert_eq!(sched.tick().unwrap(), 2);
        }
        // 0 + 1 + 2 accumulated.
        assert_eq!(sched.state_of("consumer").unwrap()[1], Value::u32_value(3));
        assert!(ch.is_empty());
    }

    #[test]
    fn lone_consumer_blocks() {
        let import_data = ImportData::new();
        let ch = ChannelRef::new();
        let mut sched = Scheduler::new(&import_data, Limits::default());
        sched.spawn(consumer(&ch), vec![]).unwrap();
        assert_eq!(
            sched.run_until_blocked(10).unwrap(),
            RunOutcome::AllBlocked
        );
        // Blocked steps leave the state untouched.
        assert_eq!(sched.state_of("consumer").unwrap()[1], Value::u32_value(0));
    }

    #[test]
    fn budget_exhausts_while_progressing() {
        let import_data = ImportData::new();
        let ch = ChannelRef::new();
        let mut sched = Scheduler::new(&import_data, Limits::default());
        sched.spawn(producer(&ch), vec![]).unwrap();
        assert_eq!(
            sched.run_until_blocked(5).unwrap(),
            RunOutcome::PassBudgetExhausted
        );
        assert_eq!(ch.len(), 5);
    }
}
