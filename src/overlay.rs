//! Cosmetic annotations for the display stream.
//!
//! Normalizers record draw commands here while they build records. Nothing in
//! an overlay feeds back into published detections; dropping the overlay
//! entirely yields identical records.

use image::Rgb;
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

use crate::frame::{Bgr, ColorFrame};

pub const BLUE: Bgr = [255, 0, 0];
pub const GREEN: Bgr = [0, 255, 0];
pub const RED: Bgr = [0, 0, 255];
pub const YELLOW: Bgr = [0, 255, 255];

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Rect {
        top_left: (i32, i32),
        bottom_right: (i32, i32),
        color: Bgr,
        thickness: u32,
    },
    Circle {
        center: (i32, i32),
        radius: i32,
        color: Bgr,
        filled: bool,
    },
    Polyline {
        points: Vec<(i32, i32)>,
        closed: bool,
        color: Bgr,
    },
    /// Text anchored at its baseline origin. Rasterized by display clients.
    Text {
        origin: (i32, i32),
        text: String,
        color: Bgr,
    },
}

/// Ordered list of draw commands for one frame.
#[derive(Clone, Debug, Default)]
pub struct Overlay {
    commands: Vec<DrawCommand>,
    disabled: bool,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// An overlay that discards everything pushed to it.
    pub fn disabled() -> Self {
        Self {
            commands: Vec::new(),
            disabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn push(&mut self, command: DrawCommand) {
        if !self.disabled {
            self.commands.push(command);
        }
    }

    pub fn rect(&mut self, top_left: (i32, i32), bottom_right: (i32, i32), color: Bgr, thickness: u32) {
        self.push(DrawCommand::Rect {
            top_left,
            bottom_right,
            color,
            thickness,
        });
    }

    pub fn circle(&mut self, center: (i32, i32), radius: i32, color: Bgr, filled: bool) {
        self.push(DrawCommand::Circle {
            center,
            radius,
            color,
            filled,
        });
    }

    pub fn text(&mut self, origin: (i32, i32), text: impl Into<String>, color: Bgr) {
        self.push(DrawCommand::Text {
            origin,
            text: text.into(),
            color,
        });
    }

    pub fn polyline(&mut self, points: Vec<(i32, i32)>, closed: bool, color: Bgr) {
        self.push(DrawCommand::Polyline {
            points,
            closed,
            color,
        });
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Rasterize shapes onto `frame`. Text is left to display clients.
    pub fn render(&self, frame: &mut ColorFrame) {
        let canvas = frame.image_mut();
        for command in &self.commands {
            match command {
                DrawCommand::Rect {
                    top_left,
                    bottom_right,
                    color,
                    thickness,
                } => {
                    for inset in 0..(*thickness).max(1) as i32 {
                        let x = top_left.0.min(bottom_right.0) + inset;
                        let y = top_left.1.min(bottom_right.1) + inset;
                        let w = (bottom_right.0 - top_left.0).abs() - 2 * inset;
                        let h = (bottom_right.1 - top_left.1).abs() - 2 * inset;
                        if w <= 0 || h <= 0 {
                            break;
                        }
                        draw_hollow_rect_mut(
                            canvas,
                            Rect::at(x, y).of_size(w as u32, h as u32),
                            Rgb(*color),
                        );
                    }
                }
                DrawCommand::Circle {
                    center,
                    radius,
                    color,
                    filled,
                } => {
                    if *radius <= 0 {
                        continue;
                    }
                    if *filled {
                        draw_filled_circle_mut(canvas, *center, *radius, Rgb(*color));
                    } else {
                        draw_hollow_circle_mut(canvas, *center, *radius, Rgb(*color));
                    }
                }
                DrawCommand::Polyline {
                    points,
                    closed,
                    color,
                } => {
                    for pair in points.windows(2) {
                        draw_segment(canvas, pair[0], pair[1], *color);
                    }
                    if *closed && points.len() > 2 {
                        draw_segment(canvas, points[points.len() - 1], points[0], *color);
                    }
                }
                DrawCommand::Text { text, .. } => {
                    log::trace!("overlay text left to display client: {}", text);
                }
            }
        }
    }
}

fn draw_segment(canvas: &mut image::RgbImage, a: (i32, i32), b: (i32, i32), color: Bgr) {
    draw_line_segment_mut(
        canvas,
        (a.0 as f32, a.1 as f32),
        (b.0 as f32, b.1 as f32),
        Rgb(color),
    );
}
