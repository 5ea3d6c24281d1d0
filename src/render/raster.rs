use std::io::Cursor;

use ab_glyph::{point, Font, FontRef, PxScale, ScaleFont};
use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};

use super::layout::{AgendaLayout, Rect, TextRun};

/// Pixel density used for shareable captures.
pub const CAPTURE_SCALE: u32 = 2;

static REGULAR_TTF: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static BOLD_TTF: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

const BADGE_FONT_PX: f32 = 11.0;
const TITLE_FONT_PX: f32 = 15.0;
const TAG_FONT_PX: f32 = 11.0;
const TEXT_FONT_PX: f32 = 13.0;
const BADGE_PADDING: u32 = 16;
const TAG_PADDING: u32 = 12;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const CARD_BORDER: Rgba<u8> = Rgba([0xe2, 0xe8, 0xf0, 255]);
const TITLE_INK: Rgba<u8> = Rgba([0x33, 0x33, 0x33, 255]);
const TAG_FILL: Rgba<u8> = Rgba([0xf1, 0xf5, 0xf9, 255]);
const TAG_INK: Rgba<u8> = Rgba([0x64, 0x74, 0x8b, 255]);
const TEXT_INK: Rgba<u8> = Rgba([0x4b, 0x55, 0x63, 255]);
const ICON_FILL: Rgba<u8> = Rgba([0xcb, 0xd5, 0xe1, 255]);
const DONE_FILL: Rgba<u8> = Rgba([0x16, 0xa3, 0x4a, 255]);
const PLACEHOLDER_INK: Rgba<u8> = Rgba([0x9c, 0xa3, 0xaf, 255]);

/// Encoded PNG snapshot of the agenda region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl RasterImage {
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

struct Fonts {
    regular: FontRef<'static>,
    bold: FontRef<'static>,
}

impl Fonts {
    fn load() -> Result<Self> {
        let regular = FontRef::try_from_slice(REGULAR_TTF)
            .map_err(|err| anyhow!("raster: load regular font: {}", err))?;
        let bold = FontRef::try_from_slice(BOLD_TTF)
            .map_err(|err| anyhow!("raster: load bold font: {}", err))?;
        Ok(Self { regular, bold })
    }
}

/// Paints `layout` at `scale`× density on a white canvas and encodes it.
pub fn capture(layout: &AgendaLayout, accent: Rgba<u8>, scale: u32) -> Result<RasterImage> {
    if scale == 0 {
        bail!("raster: scale must be positive");
    }
    let fonts = Fonts::load()?;
    let width = layout.width * scale;
    let height = layout.height * scale;
    let mut canvas = RgbaImage::from_pixel(width, height, WHITE);
    let painter = Painter { scale };

    for card in &layout.cards {
        let content = inset(card.bounds, 1);
        painter.fill(&mut canvas, card.bounds, CARD_BORDER);
        painter.fill(&mut canvas, content, WHITE);

        painter.fill(&mut canvas, card.badge.bounds, accent);
        let badge = Pen::new(&fonts.bold, BADGE_FONT_PX, WHITE).padded(BADGE_PADDING);
        painter.text(&mut canvas, &card.badge, &badge, card.badge.bounds);

        let title = Pen::new(&fonts.bold, TITLE_FONT_PX, TITLE_INK);
        for line in &card.title_lines {
            painter.text(&mut canvas, line, &title, content);
        }
        if let Some(tag) = &card.tag {
            painter.fill(&mut canvas, tag.bounds, TAG_FILL);
            let pen = Pen::new(&fonts.regular, TAG_FONT_PX, TAG_INK).padded(TAG_PADDING);
            painter.text(&mut canvas, tag, &pen, tag.bounds);
        }
        let body = Pen::new(&fonts.regular, TEXT_FONT_PX, TEXT_INK);
        for line in &card.text_lines {
            painter.text(&mut canvas, line, &body, content);
        }
        for icon in &card.icons {
            painter.disc(&mut canvas, *icon, ICON_FILL);
        }
        if card.completed {
            let mark = Rect::new(
                card.bounds.x + card.bounds.width - 24,
                card.bounds.y + 12,
                12,
                12,
            );
            painter.disc(&mut canvas, mark, DONE_FILL);
        }
    }
    if let Some(placeholder) = &layout.placeholder {
        let pen = Pen::new(&fonts.regular, TEXT_FONT_PX, PLACEHOLDER_INK);
        let clip = Rect::new(0, 0, layout.width, layout.height);
        painter.text(&mut canvas, placeholder, &pen, clip);
    }

    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("raster: encode png")?;

    Ok(RasterImage { width, height, png })
}

fn inset(rect: Rect, by: u32) -> Rect {
    Rect::new(
        rect.x + by,
        rect.y + by,
        rect.width.saturating_sub(2 * by),
        rect.height.saturating_sub(2 * by),
    )
}

/// Font, size and colour for one kind of text.
struct Pen<'f> {
    font: &'f FontRef<'static>,
    size: f32,
    ink: Rgba<u8>,
    padding: u32,
}

impl<'f> Pen<'f> {
    fn new(font: &'f FontRef<'static>, size: f32, ink: Rgba<u8>) -> Self {
        Self {
            font,
            size,
            ink,
            padding: 0,
        }
    }

    fn padded(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }
}

struct Painter {
    scale: u32,
}

impl Painter {
    fn scaled(&self, rect: Rect, canvas: &RgbaImage) -> (u32, u32, u32, u32) {
        let x0 = (rect.x * self.scale).min(canvas.width());
        let y0 = (rect.y * self.scale).min(canvas.height());
        let x1 = ((rect.x + rect.width) * self.scale).min(canvas.width());
        let y1 = ((rect.y + rect.height) * self.scale).min(canvas.height());
        (x0, y0, x1, y1)
    }

    fn fill(&self, canvas: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.scaled(rect, canvas);
        for y in y0..y1 {
            for x in x0..x1 {
                canvas.put_pixel(x, y, color);
            }
        }
    }

    fn disc(&self, canvas: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.scaled(rect, canvas);
        let cx = (x0 + x1) as f32 / 2.0;
        let cy = (y0 + y1) as f32 / 2.0;
        let r = (x1 - x0).min(y1 - y0) as f32 / 2.0;
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    canvas.put_pixel(x, y, color);
                }
            }
        }
    }

    /// Draws `run` vertically centred in its box, starting `pen.padding`
    /// in from the left. Glyph pixels outside `clip` are dropped.
    fn text(&self, canvas: &mut RgbaImage, run: &TextRun, pen: &Pen<'_>, clip: Rect) {
        let px = PxScale::from(pen.size * self.scale as f32);
        let font = pen.font.as_scaled(px);
        let (_, top, _, bottom) = self.scaled(run.bounds, canvas);
        let (cx0, cy0, cx1, cy1) = self.scaled(clip, canvas);

        let line_height = font.ascent() - font.descent();
        let baseline = top as f32 + ((bottom - top) as f32 - line_height) / 2.0 + font.ascent();
        let mut caret = ((run.bounds.x + pen.padding) * self.scale) as f32;
        let mut previous = None;

        for ch in run.text.chars().filter(|ch| !ch.is_control()) {
            let id = font.glyph_id(ch);
            if let Some(prev) = previous {
                caret += font.kern(prev, id);
            }
            previous = Some(id);
            let glyph = id.with_scale_and_position(px, point(caret, baseline));
            caret += font.h_advance(id);

            let Some(outlined) = pen.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i64 + gx as i64;
                let y = bounds.min.y as i64 + gy as i64;
                if x < cx0 as i64 || y < cy0 as i64 || x >= cx1 as i64 || y >= cy1 as i64 {
                    return;
                }
                blend(canvas.get_pixel_mut(x as u32, y as u32), pen.ink, coverage);
            });
        }
    }
}

fn blend(pixel: &mut Rgba<u8>, ink: Rgba<u8>, coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0);
    for channel in 0..3 {
        let under = pixel.0[channel] as f32;
        let over = ink.0[channel] as f32;
        pixel.0[channel] = (under + (over - under) * alpha).round() as u8;
    }
}
