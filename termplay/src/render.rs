use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;

use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{self, Clear, ClearType, SetTitle},
};
use image::{RgbaImage, imageops};

use media_pipeline::{RenderError, Renderer};
use media_types::VideoFrame;

/**
    Draws frames as rows of coloured cells, two columns per pixel so the
    pixels come out roughly square.
*/
pub struct TerminalRenderer<W> {
    out: W,
    buf: String,
    title: String,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buf: String::new(),
            title: String::new(),
        }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&mut self, frame: &VideoFrame, position: Duration) -> Result<(), RenderError> {
        let (cols, rows) = terminal::size()?;
        let (width, height) = fit_size(frame.width, frame.height, cols, rows);
        if width == 0 || height == 0 {
            return Ok(());
        }

        let image = to_image(frame)?;
        let scaled = imageops::resize(&image, width, height, imageops::FilterType::Triangle);

        self.buf.clear();
        encode_rows(&scaled, &mut self.buf);

        let title = format!("termplay {}", format_position(position));
        if title != self.title {
            queue!(self.out, SetTitle(&title))?;
            self.title = title;
        }
        queue!(
            self.out,
            MoveTo(0, 0),
            Print(&self.buf),
            Clear(ClearType::FromCursorDown)
        )?;
        self.out.flush()?;
        Ok(())
    }
}

/**
    Largest size with the frame's aspect ratio that fits a terminal of
    `cols` x `rows` cells at two columns per pixel.
*/
pub fn fit_size(width: u32, height: u32, cols: u16, rows: u16) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let max_width = u64::from(cols / 2);
    let max_height = u64::from(rows);
    let (width, height) = (u64::from(width), u64::from(height));

    let (w, h) = if width * max_height >= height * max_width {
        (max_width, height * max_width / width)
    } else {
        (width * max_height / height, max_height)
    };
    (w as u32, h as u32)
}

/**
    Format a position as `mm:ss`. Minutes keep counting past an hour.
*/
pub fn format_position(position: Duration) -> String {
    let secs = position.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/**
    Append ANSI text for `image`: one row per line, each pixel a pair of
    spaces on a 24-bit background. The colour escape is only repeated when
    the colour changes, and each line is reset and cleared to its end.
*/
pub fn encode_rows(image: &RgbaImage, out: &mut String) {
    for (y, row) in image.rows().enumerate() {
        if y > 0 {
            out.push_str("\r\n");
        }
        let mut last = None;
        for pixel in row {
            let [r, g, b, _] = pixel.0;
            if last != Some((r, g, b)) {
                let _ = write!(out, "\x1b[48;2;{r};{g};{b}m");
                last = Some((r, g, b));
            }
            out.push_str("  ");
        }
        out.push_str("\x1b[0m\x1b[K");
    }
}

fn to_image(frame: &VideoFrame) -> Result<RgbaImage, RenderError> {
    let row_bytes = frame.width as usize * 4;
    let needed = frame.stride * (frame.height as usize).saturating_sub(1) + row_bytes;
    if frame.stride < row_bytes || frame.data.len() < needed {
        return Err(RenderError::Other("frame data shorter than its size".into()));
    }

    let mut pixels = Vec::with_capacity(row_bytes * frame.height as usize);
    for y in 0..frame.height {
        pixels.extend_from_slice(frame.row(y));
    }
    RgbaImage::from_raw(frame.width, frame.height, pixels)
        .ok_or_else(|| RenderError::Other("frame does not form an image".into()))
}
