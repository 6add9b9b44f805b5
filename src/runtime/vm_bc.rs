use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::bytecode::image::{
    BytecodeImage, CALL_STACK_POINTER_POS, CALL_STACK_SIZE, CALL_STACK_START, CODE_SIZE,
    IP_HIGH_POS, IP_LOW_POS, STACK_POINTER_POS, STACK_SIZE, STACK_START,
};
use crate::bytecode::op::Op;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

pub const REGISTER_COUNT: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct VmBcConfig {
    /// Cycle budget for drivers that bound a run; the machine itself never
    /// stops on cycles.
    pub max_cycles: Option<u64>,
    /// Seed for `RNG`. Seeded runs are reproducible.
    pub seed: Option<u64>,
}

/// What one run is fed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInput {
    /// Consumed front to back by `INP`.
    pub input: Vec<i8>,
    /// When set, every `OUT` is checked against it and halting checks that
    /// all of it was produced.
    pub expected_output: Option<Vec<i8>>,
    /// Values pushed onto the data stack before the first instruction,
    /// bottom first.
    pub initial_stack: Vec<i8>,
}

impl RunInput {
    pub fn new(input: Vec<i8>) -> Self {
        RunInput {
            input,
            ..Default::default()
        }
    }

    pub fn expecting(mut self, expected: Vec<i8>) -> Self {
        self.expected_output = Some(expected);
        self
    }

    pub fn with_stack(mut self, stack: Vec<i8>) -> Self {
        self.initial_stack = stack;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Paused,
    Stopped,
}

/// Snapshot written by `DMP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDump {
    pub input: Vec<i8>,
    pub output: Vec<i8>,
    pub stack: Vec<i8>,
}

impl std::fmt::Display for VmDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "inbox: {:?}", self.input)?;
        writeln!(f, "outbox: {:?}", self.output)?;
        write!(f, "stack: {:?}", self.stack)
    }
}

/// Executes one bytecode image.
///
/// The image buffer doubles as machine memory: both stacks live in its tail
/// and the instruction pointer and subroutine stack pointer are kept in its
/// control cells. The data stack depth is tracked in a field as well, since
/// a full 256-deep stack does not fit its one-byte cell.
pub struct VmBc {
    memory: Vec<u8>,
    registers: [i8; REGISTER_COUNT],
    depth: usize,
    input: VecDeque<i8>,
    output: Vec<i8>,
    expected: Option<Vec<i8>>,
    state: VmState,
    error: Option<RuntimeError>,
    cycles: u64,
    /// Offset of the instruction being executed, for error positions.
    current: u16,
    last_dump: Option<VmDump>,
    rng: StdRng,
    config: VmBcConfig,
}

impl VmBc {
    pub fn new(image: BytecodeImage, run: RunInput) -> Self {
        Self::with_config(image, run, VmBcConfig::default())
    }

    pub fn with_config(image: BytecodeImage, run: RunInput, config: VmBcConfig) -> Self {
        let mut vm = Self {
            memory: Vec::new(),
            registers: [0; REGISTER_COUNT],
            depth: 0,
            input: VecDeque::new(),
            output: Vec::new(),
            expected: None,
            state: VmState::Running,
            error: None,
            cycles: 0,
            current: 0,
            last_dump: None,
            rng: make_rng(config.seed),
            config,
        };
        vm.init(image, run);
        vm
    }

    /// Replace everything from a previous run: memory, registers, queues,
    /// state and any recorded error.
    pub fn init(&mut self, image: BytecodeImage, run: RunInput) {
        self.memory = image.into_bytes();
        self.registers = [0; REGISTER_COUNT];
        self.input = run.input.into();
        self.output = Vec::new();
        self.expected = run.expected_output;
        self.state = VmState::Running;
        self.error = None;
        self.cycles = 0;
        self.current = 0;
        self.last_dump = None;
        self.rng = make_rng(self.config.seed);

        self.set_ip(0);
        self.set_call_sp(0);
        self.set_depth(0);
        for value in run.initial_stack.into_iter().take(STACK_SIZE) {
            self.push(value);
        }
    }

    // State & inspection

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    pub fn output(&self) -> &[i8] {
        &self.output
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn registers(&self) -> &[i8; REGISTER_COUNT] {
        &self.registers
    }

    /// Data stack contents, bottom first.
    pub fn stack(&self) -> Vec<i8> {
        self.memory[STACK_START..STACK_START + self.depth]
            .iter()
            .map(|b| *b as i8)
            .collect()
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn last_dump(&self) -> Option<&VmDump> {
        self.last_dump.as_ref()
    }

    pub fn dump(&self) -> VmDump {
        VmDump {
            input: self.input.iter().copied().collect(),
            output: self.output.clone(),
            stack: self.stack(),
        }
    }

    pub fn ip(&self) -> u16 {
        u16::from_be_bytes([self.memory[IP_HIGH_POS], self.memory[IP_LOW_POS]])
    }

    fn set_ip(&mut self, ip: u16) {
        let [high, low] = ip.to_be_bytes();
        self.memory[IP_HIGH_POS] = high;
        self.memory[IP_LOW_POS] = low;
    }

    fn call_sp(&self) -> usize {
        self.memory[CALL_STACK_POINTER_POS] as usize
    }

    fn set_call_sp(&mut self, sp: usize) {
        self.memory[CALL_STACK_POINTER_POS] = sp as u8;
    }

    fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        self.memory[STACK_POINTER_POS] = depth as u8;
    }

    // Control

    /// Run until halted, paused or failed. Returns the recorded error, if any.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.state == VmState::Running {
            self.step()?;
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn pause(&mut self) {
        if self.state == VmState::Running {
            self.state = VmState::Paused;
        }
    }

    /// Continue a paused run. Does nothing once an error has been recorded.
    pub fn resume(&mut self) {
        if self.state == VmState::Paused && self.error.is_none() {
            self.state = VmState::Running;
        }
    }

    /// Run until stopped, resuming after every `BRK`. Fails once `budget`
    /// cycles have executed without the machine stopping.
    pub fn run_to_end(&mut self, budget: Option<u64>) -> Result<(), RuntimeError> {
        loop {
            match self.state {
                VmState::Stopped => break,
                VmState::Paused => {
                    debug!(ip = self.ip(), "resuming after break");
                    self.resume();
                }
                VmState::Running => {
                    if let Some(limit) = budget {
                        if self.cycles >= limit {
                            self.current = self.ip();
                            return self.fail(RuntimeErrorKind::CycleBudgetExceeded(limit));
                        }
                    }
                    self.step()?;
                }
            }
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Execute one instruction. A stopped machine is left untouched.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        if self.state == VmState::Stopped {
            return Ok(());
        }

        self.cycles += 1;
        let ip = self.ip();
        self.current = ip;

        if ip as usize >= CODE_SIZE {
            return self.fail(RuntimeErrorKind::IpOutOfBounds(ip));
        }

        let code = self.memory[ip as usize];
        if code == 0 {
            return self.halt();
        }

        let Some(op) = Op::from_code(code) else {
            return self.fail(RuntimeErrorKind::UnknownOpcode(code));
        };

        let info = op.info();
        let (pops, pushes) = (info.pops as usize, info.pushes as usize);
        if pops > self.depth {
            return self.fail(RuntimeErrorKind::StackUnderflow);
        }
        if self.depth - pops + pushes > STACK_SIZE {
            return self.fail(RuntimeErrorKind::StackOverflow);
        }

        trace!(ip, op = %op, depth = self.depth, "step");

        self.set_ip(ip + op.encoded_len());
        self.execute(op)
    }

    fn execute(&mut self, op: Op) -> Result<(), RuntimeError> {
        match op {
            Op::Inp => match self.input.pop_front() {
                Some(value) => self.push(value),
                None => return self.halt(),
            },
            Op::Out => {
                let value = self.pop();
                self.output.push(value);
                self.check_output()?;
            }

            Op::Del => {
                self.pop();
            }
            Op::Dup => {
                let a = self.pop();
                self.push(a);
                self.push(a);
            }
            Op::Swp => {
                let a = self.pop();
                let b = self.pop();
                self.push(a);
                self.push(b);
            }
            Op::Rot => {
                let a = self.pop();
                let b = self.pop();
                let c = self.pop();
                self.push(b);
                self.push(a);
                self.push(c);
            }
            Op::Len => self.push(self.depth as u8 as i8),
            Op::Pze => self.push(0),
            Op::Psh => self.push(self.operand_byte() as i8),

            Op::Inc => {
                let a = self.pop();
                self.push(a.wrapping_add(1));
            }
            Op::Dec => {
                let a = self.pop();
                self.push(a.wrapping_sub(1));
            }
            Op::Neg => {
                let a = self.pop();
                self.push(a.wrapping_neg());
            }
            Op::Add => {
                let b = self.pop();
                let a = self.pop();
                self.push(a.wrapping_add(b));
            }
            Op::Sub => {
                let b = self.pop();
                let a = self.pop();
                self.push(a.wrapping_sub(b));
            }

            Op::Jmp => self.jump(),
            Op::Jez => self.jump_if(|v| v == 0),
            Op::Jnz => self.jump_if(|v| v != 0),
            Op::Jlz => self.jump_if(|v| v < 0),
            Op::Jgz => self.jump_if(|v| v > 0),
            Op::Jsr => {
                let sp = self.call_sp();
                if sp + 2 > CALL_STACK_SIZE {
                    return self.fail(RuntimeErrorKind::CallStackOverflow);
                }
                let [high, low] = self.ip().to_be_bytes();
                self.memory[CALL_STACK_START + sp] = high;
                self.memory[CALL_STACK_START + sp + 1] = low;
                self.set_call_sp(sp + 2);
                self.jump();
            }
            Op::Ret => {
                let sp = self.call_sp();
                if sp < 2 {
                    return self.fail(RuntimeErrorKind::CallStackUnderflow);
                }
                let low = self.memory[CALL_STACK_START + sp - 1];
                let high = self.memory[CALL_STACK_START + sp - 2];
                self.set_call_sp(sp - 2);
                self.set_ip(u16::from_be_bytes([high, low]));
            }

            Op::Lod => {
                let r = self.register_index();
                self.push(self.registers[r]);
            }
            Op::Sav => {
                let r = self.register_index();
                self.registers[r] = self.pop();
            }

            Op::Hlt => return self.halt(),
            Op::Brk => self.state = VmState::Paused,
            Op::Rng => {
                let value = self.rng.gen_range(0..=u8::MAX);
                self.push(value as i8);
            }
            Op::Dmp => {
                let dump = self.dump();
                info!(offset = self.current, "\n{}", dump);
                self.last_dump = Some(dump);
            }
        }
        Ok(())
    }

    // Helpers. Stack depth is checked in `step` before any of these run.

    fn push(&mut self, value: i8) {
        self.memory[STACK_START + self.depth] = value as u8;
        self.set_depth(self.depth + 1);
    }

    fn pop(&mut self) -> i8 {
        self.set_depth(self.depth - 1);
        self.memory[STACK_START + self.depth] as i8
    }

    fn operand_byte(&self) -> u8 {
        self.memory[self.current as usize + 1]
    }

    fn register_index(&self) -> usize {
        self.operand_byte() as usize % REGISTER_COUNT
    }

    fn jump(&mut self) {
        let at = self.current as usize;
        let target = u16::from_be_bytes([self.memory[at + 1], self.memory[at + 2]]);
        self.set_ip(target);
    }

    fn jump_if(&mut self, cond: impl Fn(i8) -> bool) {
        if cond(self.pop()) {
            self.jump();
        }
    }

    fn check_output(&mut self) -> Result<(), RuntimeError> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };
        let index = self.output.len() - 1;
        let found = self.output[index];

        let kind = match expected.get(index) {
            None => RuntimeErrorKind::TooManyOutputs {
                expected: expected.len(),
            },
            Some(want) if *want != found => RuntimeErrorKind::OutputMismatch {
                index,
                expected: *want,
                found,
            },
            Some(_) => return Ok(()),
        };
        self.fail(kind)
    }

    fn halt(&mut self) -> Result<(), RuntimeError> {
        self.state = VmState::Stopped;

        if let Some(expected) = &self.expected {
            if expected.len() > self.output.len() {
                let kind = RuntimeErrorKind::NotEnoughOutputs {
                    expected: expected.len(),
                    produced: self.output.len(),
                };
                return self.fail(kind);
            }
        }
        if self.depth > 0 {
            return self.fail(RuntimeErrorKind::StackNotEmpty(self.depth));
        }
        Ok(())
    }

    fn fail(&mut self, kind: RuntimeErrorKind) -> Result<(), RuntimeError> {
        let err = RuntimeError::new(kind, self.current);
        self.state = VmState::Stopped;
        self.error = Some(err.clone());
        Err(err)
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
