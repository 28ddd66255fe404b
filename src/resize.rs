//! # Image Resize Module
//!
//! Calcolo delle dimensioni di output per il downscaling proporzionale (filtro Lanczos3).
//!
//! ## Regole
//! - `max_width == 0`: nessun resize
//! - larghezza sorgente `<= max_width`: nessun resize, dimensioni preservate esattamente
//! - altrimenti: larghezza = `max_width`, altezza = `round(h * max_width / w)`
//! - nessuna dimensione di output scende sotto 1 pixel
//!
//! ## Esempio
//! ```text
//! 3000x2000, max_width 1920 -> 1920x1280
//!  800x600,  max_width 1920 -> invariato
//! ```

use image::imageops::FilterType;

/// Filtro usato per il downscaling
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Dimensioni di output per un'immagine `width`x`height`, `None` se non serve resize
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> Option<(u32, u32)> {
    if max_width == 0 || width <= max_width {
        return None;
    }

    let scaled = (height as f64 * max_width as f64 / width as f64).round();
    let new_height = (scaled as u32).max(1);

    Some((max_width.max(1), new_height))
}
