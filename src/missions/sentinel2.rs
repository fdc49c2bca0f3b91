//! Sentinel-2 optical products: tile-addressed queries, band selection and
//! JPEG 2000 structure checks.

use super::{assemble_query, date_clauses, Mission};
use crate::config::{Sentinel2Config, TileSpec};
use crate::dates::DateWindow;
use crate::error::{FetchError, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

pub struct Sentinel2 {
    config: Sentinel2Config,
}

impl Sentinel2 {
    pub fn new(config: Sentinel2Config) -> Sentinel2 {
        Sentinel2 { config }
    }

    fn tile(&self, id: &str) -> Result<&TileSpec> {
        self.config
            .tiles
            .iter()
            .find(|tile| tile.id == id)
            .ok_or_else(|| FetchError::Input(format!("unknown tile {id:?}")))
    }

    fn wanted_band(&self, file: &str) -> bool {
        let name = file.rsplit('/').next().unwrap_or(file);
        self.config.bands.iter().any(|band| name.contains(band.as_str()))
    }
}

impl Mission for Sentinel2 {
    fn areas(&self) -> Vec<String> {
        self.config.tiles.iter().map(|tile| tile.id.clone()).collect()
    }

    fn build_query(&self, area: &str, window: &DateWindow) -> Result<String> {
        let tile = self.tile(area)?;
        let [start, end] = date_clauses(window);
        let clauses = vec![
            "Collection/Name eq 'SENTINEL-2'".to_string(),
            start,
            end,
            format!("contains(Name,'{}')", tile.id),
            format!("contains(Name,'{}')", self.config.product_level),
            format!("contains(Name,'{}')", tile.orbit),
        ];
        Ok(assemble_query(&clauses, self.config.page_size))
    }

    /// Keeps image files whose name carries one of the configured bands.
    /// The band token must sit in the file name itself, a band-like
    /// directory name is not enough.
    fn filter_files(&self, files: &[String]) -> Vec<String> {
        files
            .iter()
            .filter(|file| file.contains("IMG_DATA") && self.wanted_band(file))
            .cloned()
            .collect()
    }

    fn validate_file(&self, path: &Path) -> Result<()> {
        let is_band_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jp2"));
        if !is_band_image {
            return Ok(());
        }
        check_jp2_structure(path).map_err(|reason| FetchError::ValidationFailed {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn summary(&self) -> String {
        format!(
            "Sentinel-2 {} bands [{}] over {} tile(s)",
            self.config.product_level,
            self.config.bands.join(", "),
            self.config.tiles.len()
        )
    }
}

struct BoxHeader {
    kind: [u8; 4],
    /// None marks a box that runs to the end of the file.
    content_len: Option<u64>,
}

/// Walks the top-level boxes of a JPEG 2000 file: signature, ftyp, a jp2h
/// holding the image header, then a codestream opening with the SOC marker.
/// A truncated transfer or an error page saved as .jp2 fails this walk.
fn check_jp2_structure(path: &Path) -> std::result::Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut reader = BufReader::new(file);

    let mut signature = [0u8; 12];
    read_bytes(&mut reader, &mut signature)?;
    if signature != JP2_SIGNATURE {
        return Err("missing signature box".to_string());
    }

    let ftyp = read_box_header(&mut reader)?.ok_or("file ends before the ftyp box")?;
    if &ftyp.kind != b"ftyp" {
        return Err("signature box is not followed by ftyp".to_string());
    }
    skip_box(&mut reader, &ftyp)?;

    let mut header_seen = false;
    while let Some(current) = read_box_header(&mut reader)? {
        match &current.kind {
            b"jp2h" => {
                let len = current.content_len.ok_or("unbounded jp2h box")?;
                check_image_header(&mut reader, len)?;
                header_seen = true;
            }
            b"jp2c" => {
                if !header_seen {
                    return Err("codestream before the jp2h box".to_string());
                }
                let mut soc = [0u8; 2];
                read_bytes(&mut reader, &mut soc)?;
                if soc != [0xFF, 0x4F] {
                    return Err("codestream does not start with SOC".to_string());
                }
                return Ok(());
            }
            _ => skip_box(&mut reader, &current)?,
        }
    }
    Err("missing codestream box".to_string())
}

fn read_box_header<R: Read>(reader: &mut R) -> std::result::Result<Option<BoxHeader>, String> {
    let mut prefix = [0u8; 8];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.to_string()),
    }
    let lbox = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let kind = [prefix[4], prefix[5], prefix[6], prefix[7]];
    let content_len = match lbox {
        0 => None,
        1 => {
            let mut extended = [0u8; 8];
            read_bytes(reader, &mut extended)?;
            let xlbox = u64::from_be_bytes(extended);
            if xlbox < 16 {
                return Err("oversize box shorter than its own header".to_string());
            }
            Some(xlbox - 16)
        }
        2..=7 => return Err("box shorter than its own header".to_string()),
        n => Some(u64::from(n) - 8),
    };
    Ok(Some(BoxHeader { kind, content_len }))
}

fn check_image_header<R: Read + Seek>(
    reader: &mut R,
    content_len: u64,
) -> std::result::Result<(), String> {
    if content_len < 22 {
        return Err("jp2h box too small for an image header".to_string());
    }
    let mut child = [0u8; 8];
    read_bytes(reader, &mut child)?;
    if &child[4..8] != b"ihdr" {
        return Err("jp2h does not start with ihdr".to_string());
    }
    if u32::from_be_bytes([child[0], child[1], child[2], child[3]]) != 22 {
        return Err("ihdr box has an unexpected length".to_string());
    }
    let mut dims = [0u8; 8];
    read_bytes(reader, &mut dims)?;
    let height = u32::from_be_bytes([dims[0], dims[1], dims[2], dims[3]]);
    let width = u32::from_be_bytes([dims[4], dims[5], dims[6], dims[7]]);
    if height == 0 || width == 0 {
        return Err("image dimensions are zero".to_string());
    }
    seek_forward(reader, content_len - 16)
}

fn skip_box<R: Seek>(reader: &mut R, header: &BoxHeader) -> std::result::Result<(), String> {
    // Only the trailing codestream may run to the end of the file.
    let len = header.content_len.ok_or_else(|| {
        format!("unbounded {} box", String::from_utf8_lossy(&header.kind))
    })?;
    seek_forward(reader, len)
}

fn seek_forward<R: Seek>(reader: &mut R, len: u64) -> std::result::Result<(), String> {
    let offset = i64::try_from(len).map_err(|_| "box length overflows".to_string())?;
    reader
        .seek(SeekFrom::Current(offset))
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::result::Result<(), String> {
    reader.read_exact(buffer).map_err(|e| e.to_string())
}
