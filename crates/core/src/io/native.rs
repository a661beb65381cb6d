//! Native multi-page GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Only the subset of GeoTIFF needed to round-trip a
//! north-up raster is handled: pixel scale, tiepoint, a minimal GeoKey
//! directory carrying the EPSG code, and the GDAL nodata tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Value written for masked samples. NaN unless a consumer needs a
    /// finite sentinel; a finite value is also recorded in the GDAL nodata tag.
    pub nodata: f32,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self { nodata: f32::NAN }
    }
}

/// Read a multi-page GeoTIFF into a Raster (one band per page)
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a multi-page GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<Raster> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<Raster> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (rows, cols) = (height as usize, width as usize);
    let mut raster = Raster::new(rows, cols);

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    let mut page = 0usize;
    loop {
        let (w, h) = decoder.dimensions()?;
        if (h as usize, w as usize) != (rows, cols) {
            return Err(Error::GeometryMismatch(format!(
                "page {} is {}x{}, first page is {}x{}",
                page, w, h, cols, rows
            )));
        }

        let name = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .ok()
            .map(|s| s.trim_end_matches('\0').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("band_{}", page + 1));
        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok());

        let mut data = decode_samples(decoder.read_image()?)?;
        if data.len() != rows * cols {
            return Err(Error::Tiff(format!(
                "page {} holds {} samples, expected {}",
                page,
                data.len(),
                rows * cols
            )));
        }
        if let Some(nd) = nodata.filter(|v| v.is_finite()) {
            for v in data.iter_mut() {
                if *v == nd {
                    *v = f64::NAN;
                }
            }
        }

        let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        raster.push_band(name, array)?;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
        page += 1;
    }

    Ok(raster)
}

fn decode_samples(result: DecodingResult) -> Result<Vec<f64>> {
    let data = match result {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err(Error::Tiff("unsupported TIFF pixel format".to_string())),
    };
    Ok(data)
}

/// Read the geotransform from ModelPixelScale + ModelTiepoint
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Tiff("cannot determine geotransform".into()))
}

/// Read an EPSG code from the GeoKey directory, if present
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u32_vec(Tag::Unknown(TAG_GEO_KEY_DIRECTORY)).ok()?;
    // header: version, revision, minor, number of keys; then 4 shorts per key
    let count = *keys.get(3)? as usize;
    keys.get(4..4 + count * 4)?
        .chunks_exact(4)
        .find(|entry| {
            let key = entry[0] as u16;
            (key == KEY_GEOGRAPHIC_TYPE || key == KEY_PROJECTED_CS_TYPE) && entry[1] == 0
        })
        .map(|entry| CRS::from_epsg(entry[3]))
}

/// Write a Raster to a multi-page GeoTIFF file
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P, options: Option<GeoTiffOptions>) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory multi-page GeoTIFF buffer
pub fn write_geotiff_to_buffer(raster: &Raster, options: Option<GeoTiffOptions>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<W: Write + Seek>(raster: &Raster, writer: W, options: &GeoTiffOptions) -> Result<()> {
    if raster.band_count() == 0 {
        return Err(Error::invalid_parameter("bands", 0, "cannot write a raster without bands"));
    }

    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = raster.shape();
    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    let geokeys = geokey_directory(raster.crs());
    let nodata_text = options.nodata.is_finite().then(|| options.nodata.to_string());

    for band in raster.bands() {
        let data: Vec<f32> = band
            .data()
            .indexed_iter()
            .map(|((r, c), _)| match raster.sample(band.data(), r, c) {
                Some(v) => v as f32,
                None => options.nodata,
            })
            .collect();

        let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
        image.encoder().write_tag(Tag::ImageDescription, band.name())?;
        image.encoder().write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
        image.encoder().write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
        image.encoder().write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), geokeys.as_slice())?;
        if let Some(text) = &nodata_text {
            image.encoder().write_tag(Tag::Unknown(TAG_GDAL_NODATA), text.as_str())?;
        }
        image.write_data(&data)?;
    }

    Ok(())
}

/// Minimal GeoKey directory: model type, raster type and, when known, the EPSG code
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let geographic = crs.is_some_and(CRS::is_geographic);
    let model = if geographic { MODEL_GEOGRAPHIC } else { MODEL_PROJECTED };

    let mut entries: Vec<[u16; 4]> = vec![
        [KEY_MODEL_TYPE, 0, 1, model],
        [KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA],
    ];
    if let Some(code) = crs.and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic { KEY_GEOGRAPHIC_TYPE } else { KEY_PROJECTED_CS_TYPE };
        entries.push([key, 0, 1, code]);
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_raster() -> Raster {
        let b4 = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f64 * 0.01);
        let mut b8 = Array2::from_elem((3, 4), 0.4);
        b8[(1, 2)] = f64::NAN;
        Raster::from_band("B4", b4)
            .with_band("B8", b8)
            .unwrap()
            .with_transform(GeoTransform::new(500_000.0, 1_100_000.0, 10.0, -10.0))
            .with_crs(CRS::utm(51, true))
    }

    #[test]
    fn test_buffer_roundtrip_keeps_bands_and_georef() {
        let raster = sample_raster();
        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        let back = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.band_names(), vec!["B4", "B8"]);
        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.crs().and_then(CRS::epsg), Some(32651));
        assert_relative_eq!(back.transform().origin_x, 500_000.0);
        assert_relative_eq!(back.transform().pixel_height, -10.0);
        assert_relative_eq!(back.band("B4").unwrap()[(2, 3)], 0.11, epsilon = 1e-6);
        assert!(back.band("B8").unwrap()[(1, 2)].is_nan());
    }

    #[test]
    fn test_file_roundtrip_with_finite_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let raster = sample_raster();

        write_geotiff(&raster, &path, Some(GeoTiffOptions { nodata: -9999.0 })).unwrap();
        let back = read_geotiff(&path).unwrap();

        assert!(back.band("B8").unwrap()[(1, 2)].is_nan());
        assert_eq!(back.valid_count("B8").unwrap(), 11);
    }

    #[test]
    fn test_geokeys_geographic() {
        let keys = geokey_directory(Some(&CRS::wgs84()));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert!(keys.chunks(4).any(|k| k == [KEY_GEOGRAPHIC_TYPE, 0, 1, 4326]));
    }
}
