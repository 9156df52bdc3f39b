//! Small algorithms shared by the unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::compatible::Compatible;
use crate::contract::{Algorithm, AlgorithmCategory, AlgorithmMetadata, PortMetadata, RunContext, RunOutput};
use crate::error::AlgorithmError;
use crate::options::OptionSpec;
use crate::types::{Data, DataKind, PortType};

/// Payload that counts how often it is dropped
pub struct DropCounter(pub Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// 0 inputs, 1 `Number` output; emits its `value` option
pub struct Source;

impl Algorithm for Source {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-source", AlgorithmCategory::Importer, "Source")
            .output(PortMetadata::new("out", "Out", Compatible::kind(DataKind::Number)))
            .option(OptionSpec::number("value", "Value", -1000.0, 1000.0, 1.0))
    }

    fn run(&self, ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let value = ctx.options().number("value").unwrap_or(0.0);
        Ok(Some(vec![Data::number(value)]))
    }
}

/// 1 `Number` input, 1 `Number` output; adds one
pub struct Increment;

impl Algorithm for Increment {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-increment", AlgorithmCategory::Filter, "Increment")
            .input(PortMetadata::new("in", "In", Compatible::kind(DataKind::Number)))
            .output(PortMetadata::new("out", "Out", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let v = number(inputs, 0)?;
        Ok(Some(vec![Data::number(v + 1.0)]))
    }
}

/// 1 `Number` input limited to a single edge, no outputs
pub struct SingleSink;

impl Algorithm for SingleSink {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-single-sink", AlgorithmCategory::Output, "Single sink")
            .input(PortMetadata::new(
                "in",
                "In",
                Compatible::kind(DataKind::Number).maximum_uses(1),
            ))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        Ok(Some(Vec::new()))
    }
}

/// 2 `Number` inputs, 1 `Feature` output (terminal); sums its inputs
pub struct Sum;

impl Algorithm for Sum {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-sum", AlgorithmCategory::FeatureExtractor, "Sum")
            .input(PortMetadata::new("a", "A", Compatible::kind(DataKind::Number)))
            .input(PortMetadata::new("b", "B", Compatible::kind(DataKind::Number)))
            .output(PortMetadata::new("sum", "Sum", Compatible::kind(DataKind::Feature)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let total = number(inputs, 0)? + number(inputs, 1)?;
        Ok(Some(vec![Data::new(DataKind::Feature, total)]))
    }
}

/// 1 `Number` input, streamed `Number` output; yields `count` tuples then returns `None`
pub struct Yielder {
    pub count: usize,
}

impl Algorithm for Yielder {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-yielder", AlgorithmCategory::Filter, "Yielder")
            .input(PortMetadata::new("in", "In", Compatible::kind(DataKind::Number)))
            .output(PortMetadata::new(
                "out",
                "Out",
                Compatible::new(PortType::kind(DataKind::Number).stream()),
            ))
    }

    fn run(&self, ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let base = number(inputs, 0)?;
        for i in 0..self.count {
            ctx.yield_outputs(vec![Data::number(base + i as f64)])
                .map_err(|e| AlgorithmError::failed(e.to_string()))?;
        }
        Ok(None)
    }
}

/// Pass-through that records every value it sees
pub struct Collect {
    pub seen: Arc<Mutex<Vec<f64>>>,
}

impl Algorithm for Collect {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-collect", AlgorithmCategory::Output, "Collect")
            .input(PortMetadata::new("in", "In", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        self.seen.lock().push(number(inputs, 0)?);
        Ok(Some(Vec::new()))
    }
}

/// How a [`Faulty`] node misbehaves
#[derive(Clone, Copy)]
pub enum Fault {
    Error,
    Panic,
    WrongArity,
}

/// 1 `Number` input, 1 `Number` output; always misbehaves
pub struct Faulty(pub Fault);

impl Algorithm for Faulty {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-faulty", AlgorithmCategory::Filter, "Faulty")
            .input(PortMetadata::new("in", "In", Compatible::kind(DataKind::Number)))
            .output(PortMetadata::new("out", "Out", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        match self.0 {
            Fault::Error => Err(AlgorithmError::failed("boom")),
            Fault::Panic => panic!("algorithm panicked"),
            Fault::WrongArity => Ok(Some(vec![Data::number(1.0), Data::number(2.0)])),
        }
    }
}

/// Simple one-shot gate used to hold an invocation inside `run`
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
    entered: Mutex<bool>,
    entered_cond: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait_open(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    pub fn mark_entered(&self) {
        *self.entered.lock() = true;
        self.entered_cond.notify_all();
    }

    pub fn wait_entered(&self) {
        let mut entered = self.entered.lock();
        while !*entered {
            self.entered_cond.wait(&mut entered);
        }
    }
}

/// 1 `Number` input, 1 `Number` output; blocks until its gate opens
pub struct Blocking {
    pub gate: Arc<Gate>,
}

impl Algorithm for Blocking {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-blocking", AlgorithmCategory::Filter, "Blocking")
            .input(PortMetadata::new("in", "In", Compatible::kind(DataKind::Number)))
            .output(PortMetadata::new("out", "Out", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        self.gate.mark_entered();
        self.gate.wait_open();
        Ok(Some(vec![Data::number(number(inputs, 0)?)]))
    }
}

/// 0 inputs, 1 `Number` output carrying a [`DropCounter`]
pub struct CountedSource {
    pub drops: Arc<AtomicUsize>,
}

impl Algorithm for CountedSource {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-counted-source", AlgorithmCategory::Importer, "Counted source")
            .output(PortMetadata::new("out", "Out", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        Ok(Some(vec![Data::new(
            DataKind::Number,
            DropCounter(Arc::clone(&self.drops)),
        )]))
    }
}

/// 1 `Number` input of any payload, no outputs; records how often it ran
pub struct Counter {
    pub runs: Arc<AtomicUsize>,
}

impl Algorithm for Counter {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-counter", AlgorithmCategory::Output, "Counter")
            .input(PortMetadata::new("in", "In", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Vec::new()))
    }
}

fn number(inputs: &[Data], index: usize) -> Result<f64, AlgorithmError> {
    inputs
        .get(index)
        .and_then(|d| d.downcast_ref::<f64>())
        .copied()
        .ok_or_else(|| AlgorithmError::InvalidInput {
            index,
            expected: "f64".to_string(),
        })
}

/// 2 `Number` inputs, no outputs; ignores payloads and counts runs
pub struct Pair {
    pub runs: Arc<AtomicUsize>,
}

impl Algorithm for Pair {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new("test-pair", AlgorithmCategory::Output, "Pair")
            .input(PortMetadata::new("a", "A", Compatible::kind(DataKind::Number)))
            .input(PortMetadata::new("b", "B", Compatible::kind(DataKind::Number)))
    }

    fn run(&self, _ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Vec::new()))
    }
}
