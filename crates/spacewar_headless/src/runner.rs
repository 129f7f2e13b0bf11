//! Headless battle runner implementation.
//!
//! Owns one deployed battle and its world. Drives it either from JSON
//! commands (interactive sessions, AI controllers) or straight to the end
//! (single runs, batches).

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use spacewar_core::battle::BattlePhase;
use spacewar_core::diagnostics::Diagnostic;
use spacewar_core::error::BattleError;
use spacewar_core::inventory::InMemoryWorld;
use spacewar_core::outcome::BattleResult;
use spacewar_core::simulation::BattleSimulation;
use spacewar_core::structure::StructureId;

use crate::protocol::{Command, Response, UnitState};
use crate::scenario::{Scenario, ScenarioError};

/// Session options.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    /// Emit a full state message after every tick command.
    pub auto_state_output: bool,
}

/// Everything a finished battle produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// RNG seed.
    pub seed: u64,
    /// Final result.
    pub result: BattleResult,
    /// State hash after the last tick.
    pub final_state_hash: u64,
    /// Non-fatal problems, with the tick they were raised on.
    pub diagnostics: Vec<(u64, Diagnostic)>,
    /// The world after write-back.
    pub world: InMemoryWorld,
}

/// Runs one battle without graphics.
#[derive(Debug)]
pub struct HeadlessRunner {
    scenario: String,
    sim: BattleSimulation,
    world: InMemoryWorld,
    config: HeadlessConfig,
    diagnostics: Vec<(u64, Diagnostic)>,
}

impl HeadlessRunner {
    /// Deploy `scenario`.
    pub fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        let (sim, world) = scenario.build()?;
        Ok(Self {
            scenario: scenario.name.clone(),
            sim,
            world,
            config: HeadlessConfig::default(),
            diagnostics: Vec::new(),
        })
    }

    /// Replace the session options.
    #[must_use]
    pub fn with_config(mut self, config: HeadlessConfig) -> Self {
        self.config = config;
        self
    }

    /// The simulation.
    #[must_use]
    pub fn simulation(&self) -> &BattleSimulation {
        &self.sim
    }

    /// The world, updated once the battle concludes.
    #[must_use]
    pub fn world(&self) -> &InMemoryWorld {
        &self.world
    }

    /// Run to conclusion, write back and report.
    ///
    /// A battle still in formation selection starts with its current
    /// formations.
    pub fn run_to_end(mut self) -> Result<RunReport, BattleError> {
        if self.sim.phase() == BattlePhase::FormationSelect {
            self.sim.start_combat()?;
        }
        let ticks = self.sim.run_to_conclusion()?;
        let result = self.sim.conclude(&mut self.world)?.clone();
        self.diagnostics.extend(self.sim.take_diagnostics());
        tracing::debug!(
            scenario = %self.scenario,
            ticks,
            diagnostics = self.diagnostics.len(),
            "run finished"
        );
        Ok(RunReport {
            seed: self.sim.config().seed,
            final_state_hash: self.sim.state_hash(),
            scenario: self.scenario,
            result,
            diagnostics: self.diagnostics,
            world: self.world,
        })
    }

    /// Interactive session: one JSON command per input line, responses as
    /// JSON lines on `output`. Ends on `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        tracing::info!(scenario = %self.scenario, "Starting interactive session");
        write!(
            output,
            "{}",
            Response::ready(self.sim.tick_count(), self.sim.phase()).to_json_line()
        )?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let responses = match Command::from_json(line) {
                Ok(cmd) => self.handle(cmd),
                Err(e) => vec![Response::error(format!("Parse error: {e}"), None)],
            };
            let quit = responses.iter().any(|r| matches!(r, Response::Bye));
            for response in &responses {
                write!(output, "{}", response.to_json_line())?;
            }
            output.flush()?;
            if quit {
                break;
            }
        }
        Ok(())
    }

    /// Execute one command.
    pub fn handle(&mut self, cmd: Command) -> Vec<Response> {
        let name = cmd.name();
        tracing::debug!(cmd = name, tick = self.sim.tick_count(), "command");
        if let Some((side, order)) = cmd.as_order() {
            return vec![self.ack_or_error(name, |sim| sim.issue_order(side, order))];
        }
        match cmd {
            Command::Tick { count } => self.tick(count),
            Command::Query => vec![self.state()],
            Command::Formation { side, template } => {
                vec![self.ack_or_error(name, |sim| sim.change_formation(side, &template))]
            }
            Command::Start => vec![self.ack_or_error(name, BattleSimulation::start_combat)],
            Command::Retreat { side } => {
                vec![self.ack_or_error(name, |sim| sim.request_retreat(side))]
            }
            Command::ConfirmRetreat => {
                vec![self.ack_or_error(name, BattleSimulation::confirm_retreat)]
            }
            Command::CancelRetreat => {
                vec![self.ack_or_error(name, BattleSimulation::cancel_retreat)]
            }
            Command::Select { unit, selected } => {
                vec![self.ack_or_error(name, |sim| sim.set_selected(StructureId(unit), selected))]
            }
            Command::Finish => self.finish(),
            Command::Hash => vec![Response::StateHash {
                tick: self.sim.tick_count(),
                hash: self.sim.state_hash(),
            }],
            Command::Layout => vec![Response::Layout {
                rows: self
                    .sim
                    .occupancy()
                    .render(self.sim.grid())
                    .lines()
                    .map(String::from)
                    .collect(),
            }],
            Command::Quit => vec![Response::Bye],
            Command::Order { .. } | Command::Attack { .. } | Command::Move { .. } => {
                vec![Response::error("order without a unit", Some(name))]
            }
        }
    }

    fn ack_or_error(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut BattleSimulation) -> Result<(), BattleError>,
    ) -> Response {
        match f(&mut self.sim) {
            Ok(()) => Response::ack(name),
            Err(e) => Response::error(e.to_string(), Some(name)),
        }
    }

    fn tick(&mut self, count: u32) -> Vec<Response> {
        if self.sim.phase() == BattlePhase::FormationSelect {
            return vec![Response::error(
                "battle is in formation selection, send start first",
                Some("tick"),
            )];
        }
        let mut shots = 0;
        let mut destroyed = Vec::new();
        for _ in 0..count {
            if self.sim.is_concluded() {
                break;
            }
            let events = self.sim.tick();
            shots += (events.beams.len() + events.launched.len()) as u32;
            destroyed.extend(events.destroyed);
        }
        self.diagnostics.extend(self.sim.take_diagnostics());

        let mut responses = vec![Response::Ticked {
            tick: self.sim.tick_count(),
            shots,
            destroyed,
            phase: self.sim.phase(),
        }];
        if self.config.auto_state_output {
            responses.push(self.state());
        }
        responses.extend(self.concluded());
        responses
    }

    fn finish(&mut self) -> Vec<Response> {
        if self.sim.phase() == BattlePhase::FormationSelect {
            if let Err(e) = self.sim.start_combat() {
                return vec![Response::error(e.to_string(), Some("finish"))];
            }
        }
        if let Err(e) = self.sim.run_to_conclusion() {
            return vec![Response::error(e.to_string(), Some("finish"))];
        }
        self.diagnostics.extend(self.sim.take_diagnostics());
        self.concluded().into_iter().collect()
    }

    fn concluded(&mut self) -> Option<Response> {
        if !self.sim.is_concluded() {
            return None;
        }
        match self.sim.conclude(&mut self.world) {
            Ok(result) => Some(Response::Concluded {
                result: Box::new(result.clone()),
            }),
            Err(e) => Some(Response::error(e.to_string(), None)),
        }
    }

    fn state(&self) -> Response {
        let units: Vec<UnitState> = self
            .sim
            .registry()
            .iter()
            .filter(|s| !s.is_projectile())
            .map(UnitState::from)
            .collect();
        let projectiles = self.sim.registry().iter().filter(|s| s.is_projectile()).count();
        Response::State {
            tick: self.sim.tick_count(),
            phase: self.sim.phase(),
            units,
            projectiles,
            hash: self.sim.state_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacewar_core::structure::Side;

    fn skirmish() -> HeadlessRunner {
        HeadlessRunner::new(&Scenario::builtin("skirmish").unwrap()).unwrap()
    }

    #[test]
    fn test_run_to_end_writes_back() {
        let report = skirmish().run_to_end().unwrap();
        assert_eq!(report.scenario, "skirmish");
        assert!(report.result.ticks > 0);
        // The loser's fleet is gone unless the battle stalled
        if let Some(side) = report.result.winner {
            let loser = side.opponent();
            assert_eq!(report.result.side(loser).survivors, 0);
        }
    }

    #[test]
    fn test_tick_and_query() {
        let mut runner = skirmish();
        let responses = runner.handle(Command::Tick { count: 5 });
        assert!(matches!(responses[0], Response::Ticked { tick: 5, .. }));

        let responses = runner.handle(Command::Query);
        match &responses[0] {
            Response::State { tick, units, .. } => {
                assert_eq!(*tick, 5);
                assert!(units.iter().any(|u| u.side == Side::Attacker));
                assert!(units.iter().any(|u| u.side == Side::Defender));
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_state_output() {
        let mut runner = skirmish().with_config(HeadlessConfig {
            auto_state_output: true,
        });
        let responses = runner.handle(Command::Tick { count: 1 });
        assert!(matches!(responses[1], Response::State { .. }));
    }

    #[test]
    fn test_invalid_phase_is_an_error_response() {
        let mut runner = skirmish();
        let responses = runner.handle(Command::ConfirmRetreat);
        assert!(matches!(&responses[0], Response::Error { cmd: Some(c), .. } if c == "confirm_retreat"));
        let responses = runner.handle(Command::Start);
        assert!(matches!(responses[0], Response::Error { .. }));
    }

    #[test]
    fn test_retreat_flow() {
        let mut runner = skirmish();
        assert!(matches!(
            runner.handle(Command::Retreat { side: Side::Attacker })[0],
            Response::Ack { .. }
        ));
        assert_eq!(runner.simulation().phase(), BattlePhase::RetreatRequested);
        assert!(matches!(runner.handle(Command::CancelRetreat)[0], Response::Ack { .. }));
        assert_eq!(runner.simulation().phase(), BattlePhase::Combat);
    }

    #[test]
    fn test_finish_concludes_once() {
        let mut runner = skirmish();
        let responses = runner.handle(Command::Finish);
        assert!(matches!(responses.last(), Some(Response::Concluded { .. })));
        assert!(runner.simulation().is_concluded());

        // Further ticks are no-ops and report the cached result
        let responses = runner.handle(Command::Tick { count: 10 });
        assert!(matches!(&responses[0], Response::Ticked { shots: 0, destroyed, .. } if destroyed.is_empty()));
        assert!(matches!(responses[1], Response::Concluded { .. }));
    }

    #[test]
    fn test_interactive_session() {
        let mut runner = skirmish();
        let input = b"{\"cmd\":\"tick\",\"count\":3}\nnot json\n\n{\"cmd\":\"hash\"}\n{\"cmd\":\"quit\"}\n{\"cmd\":\"tick\"}\n";
        let mut output = Vec::new();
        runner.run(&input[..], &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains(r#""type":"ready""#));
        assert!(lines[1].contains(r#""type":"ticked""#));
        assert!(lines[2].contains("Parse error"));
        assert!(lines[3].contains(r#""type":"state_hash""#));
        assert!(lines[4].contains(r#""type":"bye""#));
        assert_eq!(runner.simulation().tick_count(), 3);
    }

    #[test]
    fn test_layout_command() {
        let mut runner = skirmish();
        match &runner.handle(Command::Layout)[0] {
            Response::Layout { rows } => {
                assert_eq!(rows.len(), 24);
                assert!(rows.iter().all(|r| r.len() == 40));
                assert!(rows.iter().any(|r| r.contains('f')));
            }
            other => panic!("expected layout, got {other:?}"),
        }
    }
}
