//! Field snapshot files.
//!
//! One text table per flagged field per output epoch, named
//! `<name>.csv.<step>`: a header line `x, y, <name>` then one row per
//! grid point, `i, j, value`, row-major with `i` fastest. Grids with
//! `sz > 1` gain a `z` column.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use num_complex::Complex64;

use crate::errors::Result;
use crate::grid::Grid;

/// Ensures the output directory exists.
///
/// An already-existing directory is success. A colliding non-directory
/// file is reported to the caller; subsequent snapshot writes will fail
/// on their own and the simulation is allowed to continue.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Path of the snapshot for `name` at `step`.
pub fn snapshot_path(dir: &Path, name: &str, step: usize) -> PathBuf {
    dir.join(format!("{}.csv.{}", name, step))
}

/// Writes one field snapshot from its host-resident real-space state.
pub fn write_snapshot(
    dir: &Path,
    name: &str,
    step: usize,
    grid: &Grid,
    real: &[Complex64],
) -> Result<()> {
    let path = snapshot_path(dir, name, step);
    let mut out = BufWriter::new(File::create(path)?);
    if grid.sz > 1 {
        writeln!(out, "x, y, z, {}", name)?;
        for k in 0..grid.sz {
            for j in 0..grid.sy {
                for i in 0..grid.sx {
                    let v = real[grid.index(i, j, k)].re;
                    writeln!(out, "{}, {}, {}, {:.6}", i, j, k, v)?;
                }
            }
        }
    } else {
        writeln!(out, "x, y, {}", name)?;
        for j in 0..grid.sy {
            for i in 0..grid.sx {
                let v = real[grid.index(i, j, 0)].re;
                writeln!(out, "{}, {}, {:.6}", i, j, v)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}
