//! 8-bit grayscale PGM input and output.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, ImageEncoder};
use log::debug;

use crate::error::CodecError;
use crate::plane::{Geometry, Plane};

/// Decodes a P5 or P2 file. Other formats the `image` crate can read are
/// converted to 8-bit luma.
pub fn load_pgm(path: &Path) -> Result<Plane<u8>, CodecError> {
    let decoded = image::open(path).map_err(|source| CodecError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let luma = decoded.to_luma8();
    let geometry = Geometry::new(luma.height() as usize, luma.width() as usize);
    debug!("Loaded {} image from {}", geometry, path.display());

    Ok(Plane::from_raw(geometry, luma.into_raw()))
}

/// Writes a binary (P5) PGM.
pub fn save_pgm(path: &Path, plane: &Plane<u8>) -> Result<(), CodecError> {
    let geometry = plane.geometry();
    let too_large = || CodecError::TooLarge(geometry);
    let width = u32::try_from(geometry.cols).map_err(|_| too_large())?;
    let height = u32::try_from(geometry.rows).map_err(|_| too_large())?;

    let file = File::create(path).map_err(|source| CodecError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    PnmEncoder::new(BufWriter::new(file))
        .with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary))
        .write_image(plane.data(), width, height, ExtendedColorType::L8)
        .map_err(|source| CodecError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("Saved {} image to {}", geometry, path.display());
    Ok(())
}

/// `<input>_out.pgm`, next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push("_out.pgm");
    PathBuf::from(name)
}
