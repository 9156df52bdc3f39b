//! Helpers for running one algorithm outside a scheduler

use pipeline_engine::{
    Algorithm, AlgorithmError, CancellationToken, Data, InvocationEmitter, InvocationError, InvocationId, NodeId,
    OptionValues, RunContext, RunOutput, SideChannelData,
};
use std::sync::Mutex;

/// Collects yielded tuples and progress reports
#[derive(Default)]
pub struct RecordingEmitter {
    pub yields: Mutex<Vec<Vec<Data>>>,
    pub progress: Mutex<Vec<f32>>,
}

impl InvocationEmitter for RecordingEmitter {
    fn emit_yield(&self, _sequence: u64, outputs: Vec<Data>) -> Result<(), InvocationError> {
        self.yields.lock().unwrap().push(outputs);
        Ok(())
    }

    fn emit_progress(&self, percent: f32) {
        self.progress.lock().unwrap().push(percent);
    }
}

/// Outcome of one isolated run
pub struct Run {
    pub output: Result<RunOutput, AlgorithmError>,
    pub yields: Vec<Vec<Data>>,
    pub progress: Vec<f32>,
}

pub fn run(
    algorithm: &dyn Algorithm,
    options: &OptionValues,
    side_channels: &SideChannelData,
    cancel: &CancellationToken,
    inputs: &[Data],
) -> Run {
    let emitter = RecordingEmitter::default();
    let output = {
        let mut ctx = RunContext::new(NodeId(0), InvocationId(0), options, side_channels, &emitter, cancel);
        algorithm.run(&mut ctx, inputs)
    };
    Run {
        output,
        yields: emitter.yields.into_inner().unwrap(),
        progress: emitter.progress.into_inner().unwrap(),
    }
}

/// Run with the algorithm's default options and no side channels
pub fn run_default(algorithm: &dyn Algorithm, inputs: &[Data]) -> Run {
    let options = OptionValues::from_specs(&algorithm.metadata().options);
    run(
        algorithm,
        &options,
        &SideChannelData::default(),
        &CancellationToken::new(),
        inputs,
    )
}
