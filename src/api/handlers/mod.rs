mod admin;
mod image;
mod photos;
mod upload;

pub use admin::health;
pub use image::{get_image, missing_image_id};
pub use photos::{list_photos, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use upload::{upload_bulk, upload_photo};
