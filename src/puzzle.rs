use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::bytecode::compile::Assembly;
use crate::diagnostic::Diagnostic;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm_bc::{RunInput, VmBc, VmBcConfig};

#[derive(Debug, Error)]
pub enum PuzzleError {
    #[error("unable to read puzzle: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid puzzle definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// One graded run: the inbox fed to `INP` and the outbox `OUT` must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleRun {
    pub inbox: Vec<i8>,
    pub outbox: Vec<i8>,
    /// Cycle budget for this run.
    #[serde(default)]
    pub cycles: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Reference solution, informational only.
    #[serde(rename = "impl", default)]
    pub implementation: String,
    /// Code size to beat, in bytes.
    pub size_goal: u32,
    pub runs: Vec<PuzzleRun>,
}

impl Puzzle {
    pub fn from_json(text: &str) -> Result<Self, PuzzleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PuzzleError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub index: usize,
    pub passed: bool,
    pub cycles: u64,
    pub output: Vec<i8>,
    pub error: Option<RuntimeError>,
    /// The error rendered against the program source.
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub puzzle: String,
    pub runs: Vec<RunReport>,
    pub size: u32,
    pub size_goal: u32,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.runs.iter().all(|r| r.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.runs.iter().filter(|r| r.passed).count()
    }

    pub fn within_size_goal(&self) -> bool {
        self.size <= self.size_goal
    }

    pub fn total_cycles(&self) -> u64 {
        self.runs.iter().map(|r| r.cycles).sum()
    }
}

/// Run `assembly` once per puzzle run, each on a fresh machine. A failing
/// run is recorded and the next one still executes.
pub fn validate(puzzle: &Puzzle, assembly: &Assembly, config: &VmBcConfig) -> ValidationReport {
    let runs = puzzle
        .runs
        .iter()
        .enumerate()
        .map(|(index, run)| {
            let report = validate_run(index, run, assembly, config);
            info!(
                puzzle = %puzzle.name,
                run = index,
                passed = report.passed,
                cycles = report.cycles,
                "validated run"
            );
            report
        })
        .collect();

    ValidationReport {
        puzzle: puzzle.name.clone(),
        runs,
        size: assembly.image.code_len() as u32,
        size_goal: puzzle.size_goal,
    }
}

fn validate_run(
    index: usize,
    run: &PuzzleRun,
    assembly: &Assembly,
    config: &VmBcConfig,
) -> RunReport {
    let input = RunInput::new(run.inbox.clone()).expecting(run.outbox.clone());
    let mut vm = VmBc::with_config(assembly.image.clone(), input, config.clone());
    let budget = run.cycles.or(config.max_cycles);

    let error = vm.run_to_end(budget).err();
    let diagnostic = error
        .as_ref()
        .map(|e| Diagnostic::runtime(e, &assembly.source_map).to_string());

    RunReport {
        index,
        passed: error.is_none(),
        cycles: vm.cycles(),
        output: vm.output().to_vec(),
        error,
        diagnostic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::assemble;
    use crate::runtime::runtime_error::RuntimeErrorKind;

    const ADDER: &str = r#"{
        "name": "Adder",
        "description": "Add each pair of inputs",
        "impl": "inp inp add out",
        "size_goal": 4,
        "runs": [
            { "inbox": [5, 10], "outbox": [15], "cycles": 10 },
            { "inbox": [-1, 1], "outbox": [0] },
            { "inbox": [100, 100], "outbox": [-56] }
        ]
    }"#;

    fn check(source: &str, puzzle: &str) -> ValidationReport {
        let puzzle = Puzzle::from_json(puzzle).unwrap();
        let assembly = assemble(source).unwrap();
        validate(&puzzle, &assembly, &VmBcConfig::default())
    }

    #[test]
    fn test_parse_puzzle() {
        let puzzle = Puzzle::from_json(ADDER).unwrap();
        assert_eq!(puzzle.name, "Adder");
        assert_eq!(puzzle.implementation, "inp inp add out");
        assert_eq!(puzzle.runs.len(), 3);
        assert_eq!(puzzle.runs[0].cycles, Some(10));
        assert_eq!(puzzle.runs[1].cycles, None);
    }

    #[test]
    fn test_invalid_puzzle_json() {
        let err = Puzzle::from_json(r#"{ "name": "x" }"#).unwrap_err();
        assert!(matches!(err, PuzzleError::Json(_)));
        assert!(err.to_string().starts_with("invalid puzzle definition"));
    }

    #[test]
    fn test_missing_puzzle_file() {
        let err = Puzzle::load("/nonexistent/puzzle.json").unwrap_err();
        assert!(matches!(err, PuzzleError::Io(_)));
    }

    #[test]
    fn test_correct_solution_passes_every_run() {
        let report = check("inp inp add out", ADDER);
        assert!(report.passed());
        assert_eq!(report.passed_count(), 3);
        assert_eq!(report.size, 4);
        assert!(report.within_size_goal());
        assert_eq!(report.runs[0].cycles, 5);
    }

    #[test]
    fn test_wrong_solution_fails_and_later_runs_still_execute() {
        let report = check("inp inp sub out", ADDER);
        assert!(!report.passed());
        assert_eq!(report.runs.len(), 3);
        assert!(!report.runs[0].passed);
        assert!(matches!(
            report.runs[0].error.as_ref().unwrap().kind,
            RuntimeErrorKind::OutputMismatch { index: 0, .. }
        ));
        // 100 - 100 is not -56 either
        assert!(!report.runs[2].passed);
    }

    #[test]
    fn test_stack_left_over_fails_the_run() {
        let report = check("inp inp add dup out", ADDER);
        assert!(!report.passed());
        let diagnostic = report.runs[0].diagnostic.as_ref().unwrap();
        assert!(diagnostic.contains("stack must be empty"));
    }

    #[test]
    fn test_cycle_budget() {
        let puzzle = r#"{
            "name": "Loop",
            "size_goal": 10,
            "runs": [{ "inbox": [1], "outbox": [1], "cycles": 50 }]
        }"#;
        let report = check("inp out lab #spin jmp #spin", puzzle);
        let run = &report.runs[0];
        assert!(!run.passed);
        assert_eq!(run.cycles, 50);
        assert_eq!(
            run.error.as_ref().unwrap().kind,
            RuntimeErrorKind::CycleBudgetExceeded(50)
        );
    }

    #[test]
    fn test_break_is_resumed() {
        let report = check("inp brk inp add out", ADDER);
        assert!(report.passed());
    }

    #[test]
    fn test_size_goal_missed() {
        let report = check("inp inp add psh 0 add out", ADDER);
        assert!(report.passed());
        assert_eq!(report.size, 7);
        assert!(!report.within_size_goal());
    }
}
