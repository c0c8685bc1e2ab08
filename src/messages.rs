//! User-facing chat texts.

pub const FILE_RECEIVED: &str = "File received. Processing...";
pub const WORKING: &str = "Working on your request. Please wait...";
pub const EXTRACTED: &str = "Here is the text extracted: ";
pub const SUMMARIZED: &str = "Here is the summary:";
pub const ERROR: &str = "Oops! Something went wrong. Please try again.";
pub const ERROR_PROCESSING_IMAGE: &str = "Error processing image: ";
pub const ERROR_IN_IMAGE_SUFFIX: &str = "\n\nError found in image - please try again";
pub const NO_ATTACHMENT: &str = "No photo or document found in the message.";
pub const NO_TEXT: &str = "No text found in the image.";
