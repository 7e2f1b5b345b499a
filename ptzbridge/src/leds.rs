/*!
LED matrix renderer.

Holds the logical 4x5 colour grid and flushes it to the panel as one frame
of RGB triples in physical wire order.
*/

use ptz_shared::panel::{GRID_COLUMNS, GRID_ROWS};
use ptz_shared::{BridgeError, Lut, Result, Rgb, DEFAULT_LUT};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{error, warn};

/// Write attempts per flush
const SHOW_ATTEMPTS: u32 = 3;

pub const BLACK: Rgb = [0, 0, 0];
pub const RED: Rgb = [255, 0, 0];
pub const GREEN: Rgb = [0, 255, 0];
pub const BLUE: Rgb = [0, 0, 255];
pub const YELLOW: Rgb = [255, 255, 0];

pub type Grid = [[Rgb; GRID_ROWS]; GRID_COLUMNS];

pub struct LedMatrix {
    grid: Mutex<Grid>,
    writer: Mutex<Box<dyn Write + Send>>,
    lut: Lut,
}

impl LedMatrix {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self::with_lut(writer, DEFAULT_LUT)
    }

    pub fn with_lut(writer: Box<dyn Write + Send>, lut: Lut) -> Self {
        Self {
            grid: Mutex::new([[BLACK; GRID_ROWS]; GRID_COLUMNS]),
            writer: Mutex::new(writer),
            lut,
        }
    }

    fn check(x: usize, y: usize) -> Result<()> {
        if x >= GRID_COLUMNS || y >= GRID_ROWS {
            return Err(BridgeError::invalid_parameter(format!(
                "LED ({x}, {y}) outside the {GRID_COLUMNS}x{GRID_ROWS} grid"
            )));
        }
        Ok(())
    }

    fn lock_grid(&self) -> MutexGuard<'_, Grid> {
        // A panic while holding the grid leaves plain colour data behind
        self.grid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_writer(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set one cell; takes effect on the next [`show`](Self::show)
    pub fn update(&self, x: usize, y: usize, color: Rgb) -> Result<()> {
        Self::check(x, y)?;
        self.lock_grid()[x][y] = color;
        Ok(())
    }

    pub fn get(&self, x: usize, y: usize) -> Result<Rgb> {
        Self::check(x, y)?;
        Ok(self.lock_grid()[x][y])
    }

    pub fn snapshot(&self) -> Grid {
        *self.lock_grid()
    }

    /// Swap in a whole grid at once, so a flush never sees it half drawn
    pub fn replace(&self, grid: Grid) {
        *self.lock_grid() = grid;
    }

    pub fn clear_all(&self) {
        *self.lock_grid() = [[BLACK; GRID_ROWS]; GRID_COLUMNS];
    }

    /// Blank the selectable keys (columns 0..3), leaving the function column
    pub fn clear_presets(&self) {
        let mut grid = self.lock_grid();
        for column in grid.iter_mut().take(3) {
            *column = [BLACK; GRID_ROWS];
        }
    }

    /// Physical frame: one RGB triple per wire position, cells without an
    /// LED skipped
    pub fn frame(&self) -> Vec<u8> {
        let len = self.lut.iter().flatten().flatten().max().map_or(0, |max| max + 1);
        let mut frame = vec![0u8; len * 3];

        let grid = self.lock_grid();
        for (x, column) in self.lut.iter().enumerate() {
            for (y, slot) in column.iter().enumerate() {
                if let Some(index) = slot {
                    frame[index * 3..index * 3 + 3].copy_from_slice(&grid[x][y]);
                }
            }
        }
        frame
    }

    /// Flush the grid to the panel
    pub fn show(&self) -> Result<()> {
        let frame = self.frame();
        let mut writer = self.lock_writer();

        let mut attempt = 1;
        loop {
            match writer.write_all(&frame).and_then(|_| writer.flush()) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SHOW_ATTEMPTS => {
                    warn!("LED write failed (attempt {}): {}", attempt, e);
                    thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                    attempt += 1;
                }
                Err(e) => {
                    error!("Failed to write LED frame after {} attempts: {}", SHOW_ATTEMPTS, e);
                    return Err(BridgeError::SerialIo(e));
                }
            }
        }
    }

    /// Drop the panel writer, closing the device. Later flushes go nowhere.
    pub fn release(&self) {
        let writer = std::mem::replace(&mut *self.lock_writer(), Box::new(io::sink()));
        drop(writer);
    }
}
