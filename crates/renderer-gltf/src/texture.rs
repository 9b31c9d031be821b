use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex, PoisonError},
};

use gltf::{
    json::{self, validation::Checked},
    texture::{MagFilter, MinFilter, WrappingMode},
};
use image::{
    guess_format, imageops, imageops::FilterType, GenericImageView, ImageFormat, ImageReader,
};
use log::{debug, warn};

use crate::{
    backend::{PixelFormat, RenderBackend, TextureDescriptor, TextureHandle},
    buffer::ImageStore,
    document::Document,
    error::{LoadResult, ResourceError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorEncoding {
    Linear,
    Srgb,
}

/// Whether sampling with `filter` reads mipmap levels.
pub fn uses_mipmaps(filter: MinFilter) -> bool {
    !matches!(filter, MinFilter::Nearest | MinFilter::Linear)
}

/// Sampler state with defaults filled in: repeat wrapping, linear filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub wrap_s: WrappingMode,
    pub wrap_t: WrappingMode,
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            wrap_s: WrappingMode::Repeat,
            wrap_t: WrappingMode::Repeat,
            min_filter: MinFilter::Linear,
            mag_filter: MagFilter::Linear,
        }
    }
}

/// The valid value of `checked`, or `default` for an unknown code.
fn or_default<T: Copy>(checked: Option<Checked<T>>, default: T) -> T {
    match checked {
        Some(Checked::Valid(value)) => value,
        Some(Checked::Invalid) => {
            warn!("Unknown sampler code, using the default");
            default
        }
        None => default,
    }
}

impl SamplerSettings {
    pub fn from_sampler(sampler: &json::texture::Sampler) -> Self {
        let defaults = Self::default();
        Self {
            wrap_s: or_default(Some(sampler.wrap_s), defaults.wrap_s),
            wrap_t: or_default(Some(sampler.wrap_t), defaults.wrap_t),
            min_filter: or_default(sampler.min_filter, defaults.min_filter),
            mag_filter: or_default(sampler.mag_filter, defaults.mag_filter),
        }
    }

    /// Size an image must be resized to before upload, if any. Images that
    /// are not power-of-two sized only work with clamped, non-mipmapped
    /// sampling on the baseline backend.
    pub fn pot_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width.is_power_of_two() && height.is_power_of_two() {
            return None;
        }
        let clamped = self.wrap_s == WrappingMode::ClampToEdge
            && self.wrap_t == WrappingMode::ClampToEdge;
        if clamped && !uses_mipmaps(self.min_filter) {
            return None;
        }
        Some((width.next_power_of_two(), height.next_power_of_two()))
    }
}

/// Uploads textures through the backend, at most once per (image, sampler)
/// pair.
pub struct TextureResolver<B: ?Sized> {
    document: Arc<Document>,
    images: Arc<ImageStore>,
    backend: Arc<B>,
    cache: Mutex<HashMap<(usize, Option<usize>), (TextureHandle, ColorEncoding)>>,
}

impl<B: RenderBackend + ?Sized> TextureResolver<B> {
    pub fn new(document: Arc<Document>, images: Arc<ImageStore>, backend: Arc<B>) -> Self {
        Self {
            document,
            images,
            backend,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, texture: usize, encoding: ColorEncoding) -> LoadResult<TextureHandle> {
        let info = self.document.texture(texture)?;
        let image_index = info.source.value();
        if image_index == u32::MAX as usize {
            return Err(ResourceError::MissingUri {
                kind: "Texture",
                index: texture,
            }
            .into());
        }
        let sampler_index = info.sampler.map(|sampler| sampler.value());
        let key = (image_index, sampler_index);

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((handle, cached_encoding)) = cache.get(&key) {
            if *cached_encoding != encoding {
                warn!(
                    "Texture #{} requested as {:?}, but image #{} was uploaded as {:?}",
                    texture, encoding, image_index, cached_encoding
                );
            }
            return Ok(*handle);
        }

        let sampler = match sampler_index {
            Some(index) => SamplerSettings::from_sampler(self.document.sampler(index)?),
            None => SamplerSettings::default(),
        };
        let handle = self.upload(image_index, &sampler, encoding)?;
        cache.insert(key, (handle, encoding));
        Ok(handle)
    }

    fn upload(
        &self,
        index: usize,
        sampler: &SamplerSettings,
        encoding: ColorEncoding,
    ) -> LoadResult<TextureHandle> {
        let source = self.images.get(index)?;
        let name = format!("image #{}", index);
        let format = match &source.mime {
            Some(mime) => ImageFormat::from_mime_type(mime)
                .ok_or_else(|| ResourceError::BadImageMime(name.clone(), mime.clone()))?,
            None => guess_format(&source.data)
                .map_err(|error| ResourceError::BadImage(name.clone(), error))?,
        };
        let mut reader = ImageReader::new(Cursor::new(source.data.as_slice()));
        reader.set_format(format);
        let image = reader
            .decode()
            .map_err(|error| ResourceError::BadImage(name.clone(), error))?;

        let (width, height) = image.dimensions();
        let mut pixels = image.to_rgba8();
        if let Some((new_width, new_height)) = sampler.pot_size(width, height) {
            warn!(
                "Resizing {} from {}x{} to {}x{} for repeat wrapping or mipmapping",
                name, width, height, new_width, new_height
            );
            pixels = imageops::resize(&pixels, new_width, new_height, FilterType::Triangle);
        }

        let handle = self.backend.create_texture(&TextureDescriptor {
            width: pixels.width(),
            height: pixels.height(),
            data: pixels.as_raw(),
            format: PixelFormat::Rgba8,
            encoding,
            wrap_s: sampler.wrap_s,
            wrap_t: sampler.wrap_t,
            min_filter: sampler.min_filter,
            mag_filter: sampler.mag_filter,
            flip_y: false,
        });
        if uses_mipmaps(sampler.min_filter) {
            self.backend.generate_mipmaps(handle);
        }
        debug!(
            "Uploaded {} as {}x{} {:?}",
            name,
            pixels.width(),
            pixels.height(),
            encoding
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod test {
    use std::{io::Cursor, sync::Arc};

    use gltf::texture::{MagFilter, MinFilter, WrappingMode};
    use image::{ImageFormat, RgbaImage};
    use serde_json::json;

    use super::{ColorEncoding, SamplerSettings, TextureResolver};
    use crate::{
        backend::HeadlessBackend,
        buffer::{ImageSource, ImageStore},
        document::parse,
        error::{LoadError, ResourceError},
    };

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = Cursor::new(Vec::new());
        RgbaImage::new(width, height)
            .write_to(&mut data, ImageFormat::Png)
            .unwrap();
        data.into_inner()
    }

    fn resolver(
        samplers: serde_json::Value,
    ) -> (TextureResolver<HeadlessBackend>, Arc<HeadlessBackend>) {
        let document = parse(json!({
            "images": [{ "uri": "a.png" }],
            "samplers": samplers,
            "textures": [
                { "source": 0, "sampler": 0 },
                { "source": 0, "sampler": 0 },
                { "source": 0 },
                { "sampler": 0 }
            ]
        }));
        let images = ImageStore::from_images(vec![Some(ImageSource {
            data: png(300, 200),
            mime: None,
        })]);
        let backend = Arc::new(HeadlessBackend::new());
        let resolver =
            TextureResolver::new(Arc::new(document), Arc::new(images), backend.clone());
        (resolver, backend)
    }

    #[test]
    fn npot_repeat_is_resized() {
        let (resolver, backend) = resolver(json!([{ "wrapS": 10497, "wrapT": 10497 }]));
        let handle = resolver.resolve(0, ColorEncoding::Srgb).unwrap();
        let record = backend.texture(handle).unwrap();
        assert_eq!((record.width, record.height), (512, 256));
        assert_eq!(record.encoding, ColorEncoding::Srgb);
        assert!(!record.mipmapped);
    }

    #[test]
    fn npot_clamp_linear_is_kept() {
        let (resolver, backend) = resolver(json!([{
            "wrapS": 33071,
            "wrapT": 33071,
            "minFilter": 9729,
            "magFilter": 9729
        }]));
        let handle = resolver.resolve(0, ColorEncoding::Linear).unwrap();
        let record = backend.texture(handle).unwrap();
        assert_eq!((record.width, record.height), (300, 200));
        assert_eq!(record.wrap_s, WrappingMode::ClampToEdge);
    }

    #[test]
    fn mipmap_filter_forces_resize_and_mipmaps() {
        let (resolver, backend) = resolver(json!([{
            "wrapS": 33071,
            "wrapT": 33071,
            "minFilter": 9987
        }]));
        let handle = resolver.resolve(0, ColorEncoding::Srgb).unwrap();
        let record = backend.texture(handle).unwrap();
        assert_eq!((record.width, record.height), (512, 256));
        assert!(record.mipmapped);
    }

    #[test]
    fn same_image_and_sampler_upload_once() {
        let (resolver, backend) = resolver(json!([{ "wrapS": 33071, "wrapT": 33071 }]));
        let first = resolver.resolve(0, ColorEncoding::Srgb).unwrap();
        let second = resolver.resolve(1, ColorEncoding::Linear).unwrap();
        assert_eq!(first, second);
        let third = resolver.resolve(2, ColorEncoding::Srgb).unwrap();
        assert_ne!(first, third);
        assert_eq!(backend.textures().len(), 2);
    }

    #[test]
    fn sampler_defaults() {
        let settings = SamplerSettings::default();
        assert_eq!(settings.wrap_s, WrappingMode::Repeat);
        assert_eq!(settings.wrap_t, WrappingMode::Repeat);
        assert_eq!(settings.min_filter, MinFilter::Linear);
        assert_eq!(settings.mag_filter, MagFilter::Linear);
        assert_eq!(settings.pot_size(256, 128), None);
        assert_eq!(settings.pot_size(257, 128), Some((512, 128)));
    }

    #[test]
    fn unknown_sampler_codes_fall_back() {
        let document = parse(json!({
            "samplers": [{ "wrapS": 1, "wrapT": 33648, "minFilter": 2, "magFilter": 9728 }]
        }));
        let settings = SamplerSettings::from_sampler(&document.samplers[0]);
        assert_eq!(settings.wrap_s, WrappingMode::Repeat);
        assert_eq!(settings.wrap_t, WrappingMode::MirroredRepeat);
        assert_eq!(settings.min_filter, MinFilter::Linear);
        assert_eq!(settings.mag_filter, MagFilter::Nearest);
    }

    #[test]
    fn texture_without_source() {
        let (resolver, _backend) = resolver(json!([{}]));
        assert!(matches!(
            resolver.resolve(3, ColorEncoding::Srgb),
            Err(LoadError::Resource(ResourceError::MissingUri { kind: "Texture", index: 3 }))
        ));
    }
}
