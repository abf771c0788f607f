use serde::{Deserialize, Serialize};

/// One page of the curated listing as the API returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotosResponse {
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub photos: Vec<Photo>,
}

/// A curated photo. Never mutated after it arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub url: String,
    pub photographer: String,
    pub photographer_url: String,
    pub photographer_id: u64,
    pub avg_color: String,
    pub src: PhotoSrc,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub alt: String,
}

/// Differently sized renditions of the same photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSrc {
    pub original: String,
    pub large2x: String,
    pub large: String,
    pub medium: String,
    pub small: String,
    pub portrait: String,
    pub landscape: String,
    pub tiny: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Photo {
    /// Locator for a fullscreen view in the given orientation
    pub fn fullscreen_url(&self, orientation: Orientation) -> &str {
        match orientation {
            Orientation::Portrait => &self.src.portrait,
            Orientation::Landscape => &self.src.landscape,
        }
    }

    /// `avg_color` as an RGB triple, if it is a valid `#rrggbb` string
    pub fn avg_rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.avg_color.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some((r, g, b))
    }
}

#[cfg(test)]
pub(crate) fn sample_photo(id: u64) -> Photo {
    let base = format!("https://images.pexels.com/photos/{id}/pexels-photo-{id}.jpeg");
    Photo {
        id,
        width: 4000,
        height: 6000,
        url: format!("https://www.pexels.com/photo/{id}/"),
        photographer: format!("Photographer {id}"),
        photographer_url: format!("https://www.pexels.com/@p{id}"),
        photographer_id: id * 10,
        avg_color: "#7E8A92".to_string(),
        src: PhotoSrc {
            original: base.clone(),
            large2x: format!("{base}?dpr=2&h=650&w=940"),
            large: format!("{base}?h=650&w=940"),
            medium: format!("{base}?h=350"),
            small: format!("{base}?h=130"),
            portrait: format!("{base}?fit=crop&h=1200&w=800"),
            landscape: format!("{base}?fit=crop&h=627&w=1200"),
            tiny: format!("{base}?fit=crop&h=200&w=280"),
        },
        liked: false,
        alt: format!("Photo number {id}"),
    }
}
