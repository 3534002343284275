use minesweeper_ai::oracle::{ProcessOracle, SatOracle};
use minesweeper_ai::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // --- 1. Initialization ---
    let config = BotConfig::from_args(std::env::args().skip(1))?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let board = Board::random(config.height, config.width, config.mines, &mut rng)?;
    let mut game = Game::new(board);

    let mut oracle: Option<Box<dyn Oracle>> = match &config.oracle {
        OracleChoice::None => None,
        OracleChoice::Sat => Some(Box::new(SatOracle::new())),
        OracleChoice::Process(process) => {
            let mut oracle = ProcessOracle::new(process.clone());
            oracle.reset_workspace()?;
            Some(Box::new(oracle))
        }
    };

    println!("--- Autonomous Minesweeper Bot ---");
    println!("Strategy: Prioritize logically safe moves, guess randomly otherwise.");
    println!(
        "Board: {}x{} with {} mines",
        config.height, config.width, config.mines
    );

    // --- 2. Game Loop ---
    let mut move_count = 0;
    while game.game_state == GameState::Playing {
        move_count += 1;
        println!("\n--- Move #{} ---", move_count);

        match game.step(&mut rng, oracle.as_deref_mut())? {
            Some(Move::Safe(cell)) => println!("Logic found a guaranteed safe cell: {cell}"),
            Some(Move::Guess(cell)) => println!("No logically safe move found. Guessed {cell}"),
            None => {
                println!("No valid moves left for the bot to make.");
                break;
            }
        }
        print_board(&game);

        if config.delay_ms > 0 {
            thread::sleep(Duration::from_millis(config.delay_ms));
        }
    }

    // --- 3. Final Result ---
    println!("\n--- Game Over ---");

    match game.game_state {
        GameState::Won => println!("Result: The bot won!"),
        GameState::Lost => println!("Result: The bot hit a mine and lost."),
        GameState::Playing => println!("Result: The game ended unexpectedly."),
    }
    if game.game_state == GameState::Lost {
        print_mines(&game);
    }

    Ok(())
}

fn print_header(width: usize) {
    print!("   ");
    for col in 0..width {
        print!("{:^3}", col);
    }
    println!("\n  +{}", "---".repeat(width));
}

fn print_board(game: &Game) {
    let kb = &game.knowledge;
    print_header(kb.width());

    for row in 0..kb.height() {
        print!("{:^2}|", row);
        for col in 0..kb.width() {
            let cell = Cell::new(row, col);
            let display = match (game.clues.get(&cell), kb.status(cell)) {
                (Some(0), _) => "   ".to_string(),
                (Some(n), _) => format!(" {} ", n),
                (None, CellStatus::Mine) => " F ".to_string(),
                (None, CellStatus::Safe) => " . ".to_string(),
                (None, _) => " ■ ".to_string(),
            };
            print!("{}", display);
        }
        println!();
    }
    println!();
}

fn print_mines(game: &Game) {
    print_header(game.board.width());

    for row in 0..game.board.height() {
        print!("{:^2}|", row);
        for col in 0..game.board.width() {
            let cell = Cell::new(row, col);
            let display = if game.board.is_mine(cell) { " * " } else { "   " };
            print!("{}", display);
        }
        println!();
    }
}
