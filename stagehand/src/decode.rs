//! # Platform decoder orchestration
//!
//! The server never decodes anything itself; it hands encoded bytes to a
//! decoder, owns the result in a table, and optionally indexes it by a
//! caller-chosen global name for substitution during file import.
//!
//! The decoder bundle is constructed once and passed into the server
//! explicitly, so embedders can swap implementations (and tests can inject
//! stubs) without any global state.

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("font data contains no usable faces")]
    EmptyFont,
    #[error("audio decode unsupported: {0}")]
    Unsupported(&'static str),
    #[error("audio decode failed: {0}")]
    Audio(String),
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub rgba: Box<[u8]>,
}

#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub channels: u16,
    pub sample_rate: u32,
    /// Interleaved samples.
    pub samples: Box<[f32]>,
}

#[derive(Debug, Clone)]
pub struct DecodedFont {
    /// Family name of the first face.
    pub family: String,
    pub face_count: usize,
    pub data: Box<[u8]>,
}

#[derive(Debug, Clone)]
pub enum AssetPayload {
    Image(DecodedImage),
    Audio(DecodedAudio),
    Font(DecodedFont),
}

/// A decoded asset as stored in the server's table: payload plus the optional
/// global name it was registered under.
#[derive(Debug, Clone)]
pub struct DecodedAsset {
    pub name: Option<String>,
    pub payload: AssetPayload,
}

/// Audio is the one decoder the platform must supply; there is no portable
/// default. The null implementation reports failure gracefully.
pub trait AudioDecoder: Send {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, DecodeError>;
}

/// Default audio "decoder": always fails, cleanly.
pub struct NullAudioDecoder;
impl AudioDecoder for NullAudioDecoder {
    fn decode(&self, _bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
        Err(DecodeError::Unsupported("no audio decoder installed"))
    }
}

/// The decoder bundle handed to the server at construction.
pub struct PlatformDecoders {
    audio: Box<dyn AudioDecoder>,
}
impl Default for PlatformDecoders {
    fn default() -> Self {
        Self {
            audio: Box::new(NullAudioDecoder),
        }
    }
}
impl PlatformDecoders {
    #[must_use]
    pub fn with_audio(audio: Box<dyn AudioDecoder>) -> Self {
        Self { audio }
    }
    pub fn decode_image(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(DecodedImage {
            width,
            height,
            rgba: image.into_raw().into_boxed_slice(),
        })
    }
    pub fn decode_audio(&self, bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
        self.audio.decode(bytes)
    }
    pub fn decode_font(&self, bytes: &[u8]) -> Result<DecodedFont, DecodeError> {
        let mut database = fontdb::Database::new();
        database.load_font_data(bytes.to_vec());
        let Some(face) = database.faces().next() else {
            return Err(DecodeError::EmptyFont);
        };
        let family = face
            .families
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        Ok(DecodedFont {
            family,
            face_count: database.len(),
            data: bytes.to_vec().into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{DecodeError, PlatformDecoders};

    fn png_bytes() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn image_round_trip() {
        let decoders = PlatformDecoders::default();
        let decoded = decoders.decode_image(&png_bytes()).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(&decoded.rgba[0..4], &[10, 20, 30, 255]);
    }
    #[test]
    fn image_garbage_fails() {
        let decoders = PlatformDecoders::default();
        assert!(matches!(
            decoders.decode_image(b"not an image"),
            Err(DecodeError::Image(_))
        ));
    }
    #[test]
    fn font_garbage_fails() {
        let decoders = PlatformDecoders::default();
        assert!(matches!(
            decoders.decode_font(b"not a font"),
            Err(DecodeError::EmptyFont)
        ));
    }
    #[test]
    fn null_audio_fails_cleanly() {
        let decoders = PlatformDecoders::default();
        assert!(matches!(
            decoders.decode_audio(&[0, 1, 2, 3]),
            Err(DecodeError::Unsupported(_))
        ));
    }
}
