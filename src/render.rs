//! SVG command player. Walks the compiled layers in paint order and emits
//! one SVG element per drawing command; rasterization to PNG sits behind the
//! `png` feature.

use anyhow::Result;
use std::path::Path;

use crate::command::{ArrowheadKind, Compiled, DrawCommand};
use crate::style::{Color, FontSlant, FontSpec, FontWeight};

pub fn render_svg(compiled: &Compiled) -> String {
    let mut svg = String::new();
    let width = compiled.width.max(1.0);
    let height = compiled.height.max(1.0);

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.2}\" height=\"{height:.2}\" viewBox=\"0 0 {width:.2} {height:.2}\">",
    ));
    for command in compiled.commands() {
        push_command(&mut svg, command);
    }
    svg.push_str("</svg>");
    svg
}

fn push_command(svg: &mut String, command: &DrawCommand) {
    match command {
        DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color,
            selector,
        } => {
            svg.push_str(&format!(
                "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{width:.2}\" height=\"{height:.2}\" fill=\"{}\" class=\"{}\"/>",
                rgb(*color),
                escape_xml(selector)
            ));
        }
        DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            color,
            line_width,
            selector,
        } => {
            svg.push_str(&format!(
                "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{width:.2}\" height=\"{height:.2}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{line_width:.2}\" class=\"{}\"/>",
                rgb(*color),
                escape_xml(selector)
            ));
        }
        DrawCommand::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            line_width,
            dash,
            selector,
        } => {
            svg.push_str(&format!(
                "<line x1=\"{x1:.2}\" y1=\"{y1:.2}\" x2=\"{x2:.2}\" y2=\"{y2:.2}\" stroke=\"{}\" stroke-width=\"{line_width:.2}\"{} class=\"{}\"/>",
                rgb(*color),
                dash_attr(*dash),
                escape_xml(selector)
            ));
        }
        DrawCommand::Polyline {
            points,
            color,
            line_width,
            selector,
        } => {
            svg.push_str(&format!(
                "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{line_width:.2}\" class=\"{}\"/>",
                points_to_path(points, false),
                rgb(*color),
                escape_xml(selector)
            ));
        }
        DrawCommand::Arrowhead {
            tip,
            direction,
            width,
            height,
            kind,
            color,
            fill_color,
            line_width,
            selector,
        } => {
            let back = tip.0 - width * direction.sign();
            let points = [
                (back, tip.1 - height / 2.0),
                (tip.0, tip.1),
                (back, tip.1 + height / 2.0),
            ];
            let closed = matches!(kind, ArrowheadKind::Filled | ArrowheadKind::Triangle);
            svg.push_str(&format!(
                "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{line_width:.2}\" class=\"{}\"/>",
                points_to_path(&points, closed),
                rgb(*color),
                escape_xml(selector)
            ));
            if matches!(kind, ArrowheadKind::Filled) {
                svg.push_str(&format!(
                    "<path d=\"{}\" fill=\"{}\" class=\"{}\"/>",
                    points_to_path(&points, true),
                    rgb(*fill_color),
                    escape_xml(selector)
                ));
            }
        }
        DrawCommand::Text {
            x,
            baseline,
            text,
            font,
            size,
            color,
            selector,
        } => {
            svg.push_str(&format!(
                "<text x=\"{x:.2}\" y=\"{baseline:.2}\" font-family=\"{}\" font-size=\"{size:.2}\"{} fill=\"{}\" class=\"{}\">{}</text>",
                escape_xml(&font.family),
                font_style_attrs(font),
                rgb(*color),
                escape_xml(selector),
                escape_xml(text)
            ));
        }
    }
}

fn points_to_path(points: &[(f32, f32)], close: bool) -> String {
    let mut d = String::new();
    for (idx, (x, y)) in points.iter().enumerate() {
        if idx == 0 {
            d.push_str(&format!("M {x:.2} {y:.2}"));
        } else {
            d.push_str(&format!(" L {x:.2} {y:.2}"));
        }
    }
    if close && !points.is_empty() {
        d.push_str(" Z");
    }
    d
}

fn font_style_attrs(font: &FontSpec) -> String {
    let mut attrs = String::new();
    match font.slant {
        FontSlant::Normal => {}
        FontSlant::Italic => attrs.push_str(" font-style=\"italic\""),
        FontSlant::Oblique => attrs.push_str(" font-style=\"oblique\""),
    }
    if font.weight == FontWeight::Bold {
        attrs.push_str(" font-weight=\"bold\"");
    }
    attrs
}

fn dash_attr(dash: Option<[f32; 2]>) -> String {
    match dash {
        Some([on, off]) => format!(" stroke-dasharray=\"{on:.0} {off:.0}\""),
        None => String::new(),
    }
}

fn rgb(color: Color) -> String {
    let [r, g, b] = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    format!("rgb({r},{g},{b})")
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{svg}");
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path) -> Result<()> {
    let opt = usvg::Options::default();
    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("failed to allocate pixmap"))?;
    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}
