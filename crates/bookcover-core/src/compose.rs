//! Cover page compositing
//!
//! Inserts a front cover page before the first page and a back cover page
//! after the last page of an existing PDF. Each cover image is stretched to
//! the full bounds of its page.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::CoverError;
use crate::image::embed_png;

/// Suffix appended to the source stem to name the composited document
pub const RESULT_SUFFIX: &str = "-result";

/// Resource name of the cover image on an inserted page
const COVER_XOBJECT: &str = "Cover";

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };

    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::A4
    }
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::LETTER),
            other => Err(format!(
                "Unknown page size '{}'. Must be 'a4' or 'letter'",
                other
            )),
        }
    }
}

/// Options for [`compose_covers`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComposeOptions {
    /// Size of the inserted cover pages
    pub page_size: PageSize,
}

/// Add front and back cover pages to a PDF
///
/// The algorithm:
/// 1. Load the source document
/// 2. Embed the front image and insert a page at index 0 drawing it
/// 3. Embed the back image and append a page drawing it
/// 4. Serialize the whole document
pub fn compose_covers(
    pdf_bytes: &[u8],
    front_png: &[u8],
    back_png: &[u8],
    options: &ComposeOptions,
) -> Result<Vec<u8>, CoverError> {
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| CoverError::ParseError(e.to_string()))?;

    let pages_id = get_pages_root(&doc)?;
    let size = options.page_size;
    let source_pages = doc.get_pages().len();

    let front_image = embed_png(&mut doc, front_png)?;
    let front_page = add_cover_page(&mut doc, pages_id, front_image, size);

    let back_image = embed_png(&mut doc, back_png)?;
    let back_page = add_cover_page(&mut doc, pages_id, back_image, size);

    attach_cover_pages(&mut doc, pages_id, front_page, back_page)?;

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| CoverError::OperationError(format!("Failed to save PDF: {}", e)))?;

    debug!(
        "Composited covers: {} -> {} pages, {} -> {} bytes",
        source_pages,
        doc.get_pages().len(),
        pdf_bytes.len(),
        buffer.len()
    );

    Ok(buffer)
}

/// Composite covers onto the PDF at `source` and write the result beside it
///
/// The output is named by [`result_file_name`]. It is written to a temporary
/// file in the same directory and renamed into place only once the document
/// has been fully serialized. The source file is only ever read.
pub fn compose_file(
    source: &Path,
    front_png: &[u8],
    back_png: &[u8],
    options: &ComposeOptions,
) -> Result<PathBuf, CoverError> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            CoverError::OperationError(format!("Invalid source path: {}", source.display()))
        })?;

    let dir = match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let output_path = dir.join(result_file_name(file_name));

    let source_bytes = std::fs::read(source)?;
    let output = compose_covers(&source_bytes, front_png, back_png, options)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&output)?;
    tmp.persist(&output_path).map_err(|e| CoverError::Io(e.error))?;

    Ok(output_path)
}

/// Name of the composited document for a source file name
///
/// `book.pdf` becomes `book-result.pdf`.
pub fn result_file_name(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source_name);
    format!("{}{}.pdf", stem, RESULT_SUFFIX)
}

/// Find the root of the page tree
fn get_pages_root(doc: &Document) -> Result<ObjectId, CoverError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| CoverError::OperationError("No Root in trailer".into()))?;

    let catalog = doc
        .get_dictionary(catalog_id)
        .map_err(|_| CoverError::OperationError("Invalid catalog".into()))?;

    catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| CoverError::OperationError("No Pages in catalog".into()))
}

/// Create a page that draws `image_id` over its whole MediaBox
///
/// The page is not yet part of the page tree.
fn add_cover_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image_id: ObjectId,
    size: PageSize,
) -> ObjectId {
    // Unit square scaled to the page: the image fills it regardless of aspect ratio
    let content = format!(
        "q {} 0 0 {} 0 0 cm /{} Do Q",
        size.width, size.height, COVER_XOBJECT
    );
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(size.width),
            Object::Real(size.height),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                COVER_XOBJECT => image_id,
            },
        },
        "Contents" => content_id,
    })
}

/// Put the front page first and the back page last in the root page node
fn attach_cover_pages(
    doc: &mut Document,
    pages_id: ObjectId,
    front_page: ObjectId,
    back_page: ObjectId,
) -> Result<(), CoverError> {
    let pages = doc
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| CoverError::OperationError("Invalid pages dictionary".into()))?;

    let count = pages
        .get(b"Count")
        .and_then(Object::as_i64)
        .map_err(|_| CoverError::OperationError("No Count in pages dictionary".into()))?;

    let kids = pages
        .get_mut(b"Kids")
        .and_then(Object::as_array_mut)
        .map_err(|_| CoverError::OperationError("No Kids in pages dictionary".into()))?;
    kids.insert(0, Object::Reference(front_page));
    kids.push(Object::Reference(back_page));

    pages.set("Count", Object::Integer(count + 2));

    Ok(())
}
