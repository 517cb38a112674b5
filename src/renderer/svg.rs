//! SVG 叠加层绘制
//! SVG overlay drawing

use crate::pipeline::geometry::Size;
use std::fmt::Write;

/// 简单的 SVG 画布
#[derive(Debug, Clone)]
pub struct SvgCanvas {
    size: Size,
    body: String,
}

impl SvgCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            body: String::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn circle(&mut self, cx: f32, cy: f32, r: f32, fill: &str, stroke: &str) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}" stroke="{}" />"#,
            cx,
            cy,
            r,
            escape(fill),
            escape(stroke)
        );
        self
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, stroke: &str, width: f32) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{:.1}" />"#,
            x1,
            y1,
            x2,
            y2,
            escape(stroke),
            width
        );
        self
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, fill: &str, opacity: f32) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" fill-opacity="{:.2}" />"#,
            x,
            y,
            w,
            h,
            escape(fill),
            opacity
        );
        self
    }

    pub fn text(&mut self, x: f32, y: f32, text: &str, fill: &str, font_size: u32) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<text x="{:.1}" y="{:.1}" fill="{}" font-size="{}">{}</text>"#,
            x,
            y,
            escape(fill),
            font_size,
            escape(text)
        );
        self
    }

    /// 带黑色阴影的白字
    pub fn shadow_text(&mut self, x: f32, y: f32, text: &str, font_size: u32) -> &mut Self {
        self.text(x + 1.0, y + 1.0, text, "black", font_size)
            .text(x, y, text, "white", font_size)
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn finish(self) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{body}</svg>"#,
            w = self.size.width,
            h = self.size.height,
            body = self.body
        )
    }
}

/// XML 转义
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
