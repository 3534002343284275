use std::collections::BTreeMap;

use rand::Rng;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::oracle::{self, Oracle, ProcessConfig};
use crate::{Board, Cell, KnowledgeBase, Move};

/// Which oracle, if any, the bot consults before each move.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OracleChoice {
    #[default]
    None,
    Sat,
    Process(ProcessConfig),
}

/// Settings for an autonomous game.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BotConfig {
    pub height: usize,
    pub width: usize,
    pub mines: usize,
    /// Seed for mine placement and guesses; random when absent.
    pub seed: Option<u64>,
    /// Pause between moves, to make the game watchable.
    pub delay_ms: u64,
    pub oracle: OracleChoice,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            height: 8,
            width: 8,
            mines: 8,
            seed: None,
            delay_ms: 0,
            oracle: OracleChoice::None,
        }
    }
}

impl BotConfig {
    /// Builds a config from command line flags, starting from the defaults.
    ///
    /// `--oracle` takes `none`, `sat`, or the path of a solver program.
    pub fn from_args<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = BotConfig::default();
        let mut timeout_ms: Option<u64> = None;
        let mut args = args.into_iter().map(Into::into);

        while let Some(flag) = args.next() {
            let mut value = || {
                args.next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
            };
            match flag.as_str() {
                "--height" => config.height = value()?.parse()?,
                "--width" => config.width = value()?.parse()?,
                "--mines" => config.mines = value()?.parse()?,
                "--seed" => config.seed = Some(value()?.parse()?),
                "--delay-ms" => config.delay_ms = value()?.parse()?,
                "--timeout-ms" => timeout_ms = Some(value()?.parse()?),
                "--oracle" => {
                    config.oracle = match value()?.as_str() {
                        "none" => OracleChoice::None,
                        "sat" => OracleChoice::Sat,
                        program => OracleChoice::Process(ProcessConfig {
                            program: program.into(),
                            ..ProcessConfig::default()
                        }),
                    }
                }
                other => anyhow::bail!("unknown argument: {other}"),
            }
        }

        if let Some(timeout_ms) = timeout_ms {
            match &mut config.oracle {
                OracleChoice::Process(process) => process.timeout_ms = timeout_ms,
                _ => anyhow::bail!("--timeout-ms only applies to an external oracle"),
            }
        }
        if config.height == 0 || config.width == 0 {
            anyhow::bail!("the board needs at least one row and one column");
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GameState {
    Playing,
    Won,
    Lost,
}

/// A bot playing against a ground-truth board.
pub struct Game {
    pub board: Board,
    pub knowledge: KnowledgeBase,
    /// Revealed cells and their clues.
    pub clues: BTreeMap<Cell, usize>,
    /// Moves in the order they were played.
    pub history: Vec<Move>,
    pub game_state: GameState,
}

impl Game {
    pub fn new(board: Board) -> Self {
        let knowledge = KnowledgeBase::new(board.height(), board.width());
        Game {
            board,
            knowledge,
            clues: BTreeMap::new(),
            history: Vec::new(),
            game_state: GameState::Playing,
        }
    }

    /// Probes `cell`. Returns `false` if it was a mine.
    pub fn reveal(&mut self, cell: Cell) -> anyhow::Result<bool> {
        if self.game_state != GameState::Playing {
            anyhow::bail!("game_ended");
        }

        if self.board.is_mine(cell) {
            self.game_state = GameState::Lost;
            return Ok(false);
        }

        let count = self.board.nearby_mine_count(cell);
        self.knowledge.add_clue(cell, count)?;
        self.clues.insert(cell, count);

        if self.board.is_cleared(self.knowledge.moves_made())
            || self.board.is_won(self.knowledge.mines())
        {
            self.game_state = GameState::Won;
        }
        Ok(true)
    }

    /// Plays one move: asks the oracle if there is one, then probes a safe
    /// cell or guesses. Returns the move, or `None` once nothing is left.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        oracle: Option<&mut (dyn Oracle + '_)>,
    ) -> anyhow::Result<Option<Move>> {
        if let Some(oracle) = oracle {
            if let Err(e) = oracle::consult(&mut self.knowledge, oracle) {
                warn!(error = %e, "oracle failed, falling back to propagation");
            }
        }

        let next = match self.knowledge.choose_move(rng) {
            Ok(next) => next,
            Err(EngineError::NoMovesAvailable) => {
                info!("no moves left to make");
                if self.board.is_won(self.knowledge.mines()) {
                    self.game_state = GameState::Won;
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match next {
            Move::Safe(cell) => info!(%cell, "revealing proven safe cell"),
            Move::Guess(cell) => info!(%cell, "no certain move, guessing"),
        }
        self.history.push(next);
        self.reveal(next.cell())?;
        Ok(Some(next))
    }

    /// Steps until the game is decided or the bot runs out of moves.
    pub fn play<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        mut oracle: Option<&mut (dyn Oracle + '_)>,
    ) -> anyhow::Result<GameState> {
        while self.game_state == GameState::Playing {
            if self.step(rng, oracle.as_deref_mut())?.is_none() {
                break;
            }
        }
        Ok(self.game_state)
    }
}
