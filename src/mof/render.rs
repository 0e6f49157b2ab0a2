//! Structure rendering for the visualizer.

use std::fmt::Write as _;

use super::cif::Crystal;

/// A rendered image ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

pub trait StructureRenderer: Send + Sync {
    fn render(&self, crystal: &Crystal) -> anyhow::Result<RenderedImage>;
}

/// Orthographic projection onto the xy plane as SVG.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    pub size: u32,
    pub margin: f64,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            size: 600,
            margin: 30.0,
        }
    }
}

impl StructureRenderer for SvgRenderer {
    fn render(&self, crystal: &Crystal) -> anyhow::Result<RenderedImage> {
        let corners: Vec<[f64; 3]> = (0..8)
            .map(|i| {
                let f = [(i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64];
                crystal.cell.to_cartesian(f)
            })
            .collect();

        let mut atoms: Vec<([f64; 3], &str)> = crystal
            .atoms
            .iter()
            .map(|a| {
                let wrapped = a.frac.map(|v| v.rem_euclid(1.0));
                (crystal.cell.to_cartesian(wrapped), a.element.as_str())
            })
            .collect();

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in corners.iter().chain(atoms.iter().map(|(p, _)| p)) {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        let extent = (max_x - min_x).max(max_y - min_y).max(1e-6);
        let scale = (self.size as f64 - 2.0 * self.margin) / extent;
        let project = |p: &[f64; 3]| {
            (
                self.margin + (p[0] - min_x) * scale,
                self.size as f64 - self.margin - (p[1] - min_y) * scale,
            )
        };

        let mut svg = String::new();
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{0}" height="{0}" viewBox="0 0 {0} {0}">"#,
            self.size
        )?;
        writeln!(svg, "<title>{}</title>", escape(&crystal.name))?;
        writeln!(svg, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;

        // Cell edges join corners that differ in exactly one fractional axis.
        for i in 0..8usize {
            for axis in 0..3 {
                let j = i | (1 << axis);
                if j != i {
                    let (x1, y1) = project(&corners[i]);
                    let (x2, y2) = project(&corners[j]);
                    writeln!(
                        svg,
                        r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#808080" stroke-width="1"/>"##,
                        x1, y1, x2, y2
                    )?;
                }
            }
        }

        // Painter's order: far atoms first.
        atoms.sort_by(|a, b| a.0[2].total_cmp(&b.0[2]));
        for (p, element) in &atoms {
            let (x, y) = project(p);
            let radius = (covalent_radius(element) * scale * 0.5).max(1.5);
            writeln!(
                svg,
                r##"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" stroke="#202020" stroke-width="0.5"><title>{}</title></circle>"##,
                x,
                y,
                radius,
                cpk_color(element),
                escape(element)
            )?;
        }
        svg.push_str("</svg>\n");

        Ok(RenderedImage {
            extension: "svg",
            bytes: svg.into_bytes(),
        })
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn cpk_color(element: &str) -> &'static str {
    match element {
        "H" => "#ffffff",
        "C" => "#909090",
        "N" => "#3050f8",
        "O" => "#ff0d0d",
        "F" | "Cl" => "#1ff01f",
        "S" => "#ffff30",
        "P" => "#ff8000",
        "Br" => "#a62929",
        "Zn" => "#7d80b0",
        "Cu" => "#c88033",
        "Co" => "#f090a0",
        "Ni" => "#50d050",
        "Fe" => "#e06633",
        "Mn" => "#9c7ac7",
        "Mg" => "#8aff00",
        "Zr" => "#94e0e0",
        "Al" => "#bfa6a6",
        "Cd" => "#ffd98f",
        _ => "#ff1493",
    }
}

fn covalent_radius(element: &str) -> f64 {
    match element {
        "H" => 0.31,
        "C" => 0.76,
        "N" => 0.71,
        "O" => 0.66,
        "F" => 0.57,
        "S" => 1.05,
        "P" => 1.07,
        "Cl" => 1.02,
        "Br" => 1.20,
        "Mg" => 1.41,
        "Al" => 1.21,
        "Zn" => 1.22,
        "Cu" => 1.32,
        "Co" | "Ni" => 1.24,
        "Fe" => 1.32,
        "Mn" => 1.39,
        "Zr" => 1.75,
        "Cd" => 1.44,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mof::cif::fixtures::SIMPLE_CIF;

    #[test]
    fn renders_atoms_and_cell() {
        let crystal = Crystal::parse(SIMPLE_CIF).unwrap();
        let image = SvgRenderer::default().render(&crystal).unwrap();
        assert_eq!(image.extension, "svg");
        let svg = String::from_utf8(image.bytes).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("<title>XEGKUR</title>"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert_eq!(svg.matches("<line").count(), 12);
        assert!(svg.contains(cpk_color("Cu")));
    }

    #[test]
    fn atoms_are_drawn_back_to_front() {
        let crystal = Crystal::parse(SIMPLE_CIF).unwrap();
        let svg = String::from_utf8(SvgRenderer::default().render(&crystal).unwrap().bytes).unwrap();
        let copper = svg.find(cpk_color("Cu")).unwrap();
        let carbon = svg.find(cpk_color("C")).unwrap();
        assert!(copper < carbon);
    }
}
