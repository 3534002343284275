use minesweeper_ai as ms;
use rand::SeedableRng;
use rand::rngs::StdRng;
use wasm_bindgen::prelude::*;

fn load(bts: &[u8]) -> Result<ms::KnowledgeBase, String> {
    ms::KnowledgeBase::from_bytes(bts).map_err(|e| e.to_string())
}

fn store(kb: &ms::KnowledgeBase) -> Result<Vec<u8>, String> {
    kb.to_bytes().map_err(|e| e.to_string())
}

#[wasm_bindgen]
pub fn create_knowledge(height: u8, width: u8) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let kb = ms::KnowledgeBase::new(height as usize, width as usize);
    store(&kb)
}

#[wasm_bindgen]
pub fn add_clue(bts: Vec<u8>, row: usize, col: usize, count: u8) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let mut kb = load(&bts)?;
    kb.add_clue(ms::Cell::new(row, col), count as usize)
        .map_err(|e| e.to_string())?;
    store(&kb)
}

/// `[row, col]` of the next proven-safe cell, or empty when there is none.
#[wasm_bindgen]
pub fn safe_move(bts: Vec<u8>) -> Result<Vec<u32>, String> {
    console_error_panic_hook::set_once();

    let kb = load(&bts)?;
    Ok(kb
        .choose_safe_move()
        .map(|cell| vec![cell.row as u32, cell.col as u32])
        .unwrap_or_default())
}

#[wasm_bindgen]
pub fn random_move(bts: Vec<u8>, seed: u64) -> Result<Vec<u32>, String> {
    console_error_panic_hook::set_once();

    let kb = load(&bts)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let cell = kb.choose_random_move(&mut rng).map_err(|e| e.to_string())?;
    Ok(vec![cell.row as u32, cell.col as u32])
}

/// Row-major cell states: -1 unknown, 0 safe, 1 mine, 2 probed.
#[wasm_bindgen]
pub fn get_cells(bts: Vec<u8>) -> Result<Vec<i8>, String> {
    console_error_panic_hook::set_once();

    let kb = load(&bts)?;
    Ok(kb
        .cells()
        .map(|cell| match kb.status(cell) {
            ms::CellStatus::Unknown => -1,
            ms::CellStatus::Safe => 0,
            ms::CellStatus::Mine => 1,
            ms::CellStatus::Probed => 2,
        })
        .collect())
}
