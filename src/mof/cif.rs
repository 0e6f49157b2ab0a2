//! Minimal CIF reader: unit cell and fractional atom sites.

use std::path::Path;

use anyhow::{anyhow, Context};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl UnitCell {
    /// Cell vectors as rows, `a` along x and `b` in the xy plane.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        let (alpha, beta, gamma) = (
            self.alpha.to_radians(),
            self.beta.to_radians(),
            self.gamma.to_radians(),
        );
        let cx = self.c * beta.cos();
        let cy = self.c * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
        let cz = (self.c * self.c - cx * cx - cy * cy).max(0.0).sqrt();
        [
            [self.a, 0.0, 0.0],
            [self.b * gamma.cos(), self.b * gamma.sin(), 0.0],
            [cx, cy, cz],
        ]
    }

    pub fn to_cartesian(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix();
        let mut out = [0.0; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            *value = frac[0] * m[0][axis] + frac[1] * m[1][axis] + frac[2] * m[2][axis];
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomSite {
    pub label: String,
    pub element: String,
    pub frac: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crystal {
    pub name: String,
    pub cell: UnitCell,
    pub atoms: Vec<AtomSite>,
}

impl Crystal {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut name = String::new();
        let mut cell = [None::<f64>; 6];
        let mut atoms = Vec::new();

        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if let Some(block) = line.strip_prefix("data_") {
                name = block.trim().to_string();
                i += 1;
            } else if line == "loop_" {
                let mut columns = Vec::new();
                i += 1;
                while i < lines.len() && lines[i].starts_with('_') {
                    columns.push(lines[i].split_whitespace().next().unwrap_or_default());
                    i += 1;
                }
                let site_loop = columns.iter().any(|c| c.starts_with("_atom_site_fract_"));
                while i < lines.len() && !is_section_start(lines[i]) {
                    if site_loop {
                        if let Some(atom) = parse_site(&columns, lines[i])? {
                            atoms.push(atom);
                        }
                    }
                    i += 1;
                }
            } else {
                let mut parts = line.split_whitespace();
                if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                    let slot = match key {
                        "_cell_length_a" => Some(0),
                        "_cell_length_b" => Some(1),
                        "_cell_length_c" => Some(2),
                        "_cell_angle_alpha" => Some(3),
                        "_cell_angle_beta" => Some(4),
                        "_cell_angle_gamma" => Some(5),
                        _ => None,
                    };
                    if let Some(slot) = slot {
                        cell[slot] = Some(parse_number(value).ok_or_else(|| {
                            anyhow!("invalid value {} for {}", value, key)
                        })?);
                    }
                }
                i += 1;
            }
        }

        let names = ["a", "b", "c", "alpha", "beta", "gamma"];
        let mut values = [0.0; 6];
        for (slot, value) in cell.iter().enumerate() {
            values[slot] = value.ok_or_else(|| anyhow!("missing cell parameter {}", names[slot]))?;
        }
        if atoms.is_empty() {
            return Err(anyhow!("no atom sites"));
        }

        Ok(Self {
            name,
            cell: UnitCell {
                a: values[0],
                b: values[1],
                c: values[2],
                alpha: values[3],
                beta: values[4],
                gamma: values[5],
            },
            atoms,
        })
    }
}

fn is_section_start(line: &str) -> bool {
    line.starts_with('_') || line == "loop_" || line.starts_with("data_")
}

fn parse_site(columns: &[&str], line: &str) -> anyhow::Result<Option<AtomSite>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < columns.len() {
        return Ok(None);
    }
    let field = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .map(|idx| fields[idx])
    };

    let label = field("_atom_site_label").unwrap_or_default().to_string();
    let element = field("_atom_site_type_symbol")
        .map(str::to_string)
        .unwrap_or_else(|| element_from_label(&label));

    let mut frac = [0.0; 3];
    for (axis, name) in ["_atom_site_fract_x", "_atom_site_fract_y", "_atom_site_fract_z"]
        .iter()
        .enumerate()
    {
        let raw = field(name).ok_or_else(|| anyhow!("atom loop lacks {}", name))?;
        frac[axis] = parse_number(raw).ok_or_else(|| anyhow!("invalid coordinate {}", raw))?;
    }

    Ok(Some(AtomSite {
        label,
        element,
        frac,
    }))
}

/// Numbers may carry a standard uncertainty such as `10.123(4)`.
fn parse_number(raw: &str) -> Option<f64> {
    let end = raw.find('(').unwrap_or(raw.len());
    raw[..end].parse().ok()
}

fn element_from_label(label: &str) -> String {
    let letters: String = label.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let mut chars = letters.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if second.is_ascii_lowercase() => {
            format!("{}{}", first.to_ascii_uppercase(), second)
        }
        (Some(first), _) => first.to_ascii_uppercase().to_string(),
        _ => "X".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::SIMPLE_CIF;
    use super::*;

    #[test]
    fn parses_cell_and_sites() {
        let crystal = Crystal::parse(SIMPLE_CIF).unwrap();
        assert_eq!(crystal.name, "XEGKUR");
        assert_eq!(crystal.cell.c, 12.5);
        assert_eq!(crystal.atoms.len(), 3);
        assert_eq!(crystal.atoms[1].element, "O");
        assert_eq!(crystal.atoms[2].frac, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn orthogonal_cell_maps_directly() {
        let crystal = Crystal::parse(SIMPLE_CIF).unwrap();
        let p = crystal.cell.to_cartesian([0.5, 0.5, 0.5]);
        assert!((p[0] - 5.0).abs() < 1e-9);
        assert!((p[1] - 5.0).abs() < 1e-9);
        assert!((p[2] - 6.25).abs() < 1e-9);
    }

    #[test]
    fn element_falls_back_to_label() {
        let text = SIMPLE_CIF
            .replace("_atom_site_type_symbol\n", "")
            .replace("Cu1 Cu ", "Zn2 ")
            .replace("O1 O ", "O1 ")
            .replace("C1 C ", "C1 ");
        let crystal = Crystal::parse(&text).unwrap();
        assert_eq!(crystal.atoms[0].element, "Zn");
        assert_eq!(crystal.atoms[1].element, "O");
    }

    #[test]
    fn missing_cell_is_an_error() {
        let text = SIMPLE_CIF.replace("_cell_angle_gamma 90\n", "");
        let err = Crystal::parse(&text).unwrap_err();
        assert!(err.to_string().contains("gamma"));
    }
}
