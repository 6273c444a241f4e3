//! Shape bank: embedded hardware-derived pole tables plus optional JSON data
//!
//! Four morph pairs, each a pair of six-pole shapes captured at the 48 kHz
//! reference rate. The embedded tables are the stability-corrected set and
//! are always available; measured shape files can be layered on top at
//! startup and fall back cleanly when missing or malformed.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zm_core::{Sample, ZmError, ZmResult};

use crate::pole::Pole;
use crate::NUM_SECTIONS;

/// One filter shape: six conjugate pole pairs at the reference rate
pub type Shape = [Pole; NUM_SECTIONS];

/// Which morph pair the engine interpolates between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShapePair {
    /// Formant sweep, speech-like resonances
    #[default]
    Vowel,
    /// Bright metallic clusters
    Bell,
    /// Punchy low-frequency emphasis
    Low,
    /// Ultra-low rumble
    Sub,
}

impl ShapePair {
    pub const ALL: [ShapePair; 4] = [Self::Vowel, Self::Bell, Self::Low, Self::Sub];

    pub fn index(self) -> usize {
        match self {
            Self::Vowel => 0,
            Self::Bell => 1,
            Self::Low => 2,
            Self::Sub => 3,
        }
    }

    /// Map a numeric selector (UI parameter) onto a pair; out-of-range
    /// values pin to the last pair.
    pub fn from_index(i: usize) -> Self {
        *Self::ALL.get(i).unwrap_or(&Self::Sub)
    }
}

const fn shape(raw: [Sample; 2 * NUM_SECTIONS]) -> Shape {
    [
        Pole::new(raw[0], raw[1]),
        Pole::new(raw[2], raw[3]),
        Pole::new(raw[4], raw[5]),
        Pole::new(raw[6], raw[7]),
        Pole::new(raw[8], raw[9]),
        Pole::new(raw[10], raw[11]),
    ]
}

// Top two Vowel-A radii pulled back by 0.002 for intensity headroom.
const VOWEL_A: Shape = shape([
    0.95, 0.010_471_975_515_299_28,
    0.96, 0.019_634_954_091_186_15,
    0.985, 0.039_269_908_182_372_30,
    0.990, 0.117_809_724_547_116_90,
    0.991, 0.327_249_234_853_102_50,
    0.985, 0.458_148_928_794_344_35,
]);

const VOWEL_B: Shape = shape([
    0.88, 0.005_235_987_757_649_64,
    0.90, 0.010_471_975_515_299_28,
    0.92, 0.020_943_951_030_598_56,
    0.94, 0.041_887_902_061_197_12,
    0.96, 0.083_775_804_122_394_24,
    0.97, 0.167_551_608_244_788_48,
]);

// Top two Bell-A radii pulled back by 0.003; the as-measured 0.996/0.995
// left no margin once intensity boost was applied.
const BELL_A: Shape = shape([
    0.993, 0.143_989_663_335_365_10,
    0.992, 0.183_259_571_517_737_40,
    0.994, 0.287_979_326_670_730_20,
    0.993, 0.392_699_081_823_723_00,
    0.992, 0.549_778_714_378_165_00,
    0.990, 0.785_398_163_647_446_30,
]);

const BELL_B: Shape = shape([
    0.994, 0.196_349_540_857_717_40,
    0.993, 0.261_799_387_798_144_50,
    0.992, 0.392_699_081_823_723_00,
    0.991, 0.523_598_775_849_301_50,
    0.990, 0.706_858_347_415_925_50,
    0.988, 0.942_477_796_058_139_00,
]);

const LOW_A: Shape = shape([
    0.88, 0.003_926_990_818_237_23,
    0.90, 0.007_853_981_636_474_46,
    0.92, 0.015_707_963_272_948_93,
    0.94, 0.032_724_923_485_310_62,
    0.96, 0.065_449_846_970_621_24,
    0.97, 0.130_899_693_941_241_00,
]);

const LOW_B: Shape = shape([
    0.92, 0.006_544_984_697_062_12,
    0.94, 0.013_089_969_394_124_25,
    0.96, 0.026_179_938_788_248_50,
    0.97, 0.052_359_877_556_497_00,
    0.98, 0.104_719_755_112_994_00,
    0.985, 0.209_439_510_225_988_00,
]);

const SUB_A: Shape = shape([
    0.85, 0.001_308_996_94,
    0.87, 0.002_617_993_88,
    0.89, 0.005_235_987_76,
    0.91, 0.010_471_975_51,
    0.93, 0.020_943_951_03,
    0.95, 0.041_887_902_06,
]);

const SUB_B: Shape = shape([
    0.92, 0.008_726_646_26,
    0.94, 0.017_453_292_52,
    0.96, 0.034_906_585_04,
    0.97, 0.069_813_170_08,
    0.98, 0.104_719_755_11,
    0.97, 0.139_626_340_16,
]);

/// Embedded endpoint shapes for all four pairs, indexed by `ShapePair::index`
const EMBEDDED_PAIRS: [(Shape, Shape); 4] = [
    (VOWEL_A, VOWEL_B),
    (BELL_A, BELL_B),
    (LOW_A, LOW_B),
    (SUB_A, SUB_B),
];

/// JSON wire format for measured shape files
#[derive(Debug, Serialize, Deserialize)]
struct ShapeFile {
    shapes: Vec<ShapeEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShapeEntry {
    poles: Vec<PoleEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PoleEntry {
    r: Sample,
    theta: Sample,
}

/// Holds the A/B endpoints for every morph pair
#[derive(Debug, Clone)]
pub struct ShapeBank {
    pairs: [(Shape, Shape); 4],
    has_runtime_data: bool,
}

impl Default for ShapeBank {
    fn default() -> Self {
        Self {
            pairs: EMBEDDED_PAIRS,
            has_runtime_data: false,
        }
    }
}

impl ShapeBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn num_shapes(&self) -> usize {
        self.pairs.len() * 2
    }

    /// Flat shape index: pair `i` occupies slots `2i` (A) and `2i+1` (B).
    /// Out-of-range indices clamp to the last shape.
    pub fn shape(&self, index: usize) -> &Shape {
        let index = index.min(self.num_shapes() - 1);
        let (a, b) = &self.pairs[index / 2];
        if index % 2 == 0 {
            a
        } else {
            b
        }
    }

    /// Flat indices of a pair's A/B endpoints
    pub fn morph_pair_indices(&self, pair: ShapePair) -> (usize, usize) {
        let i = pair.index();
        (2 * i, 2 * i + 1)
    }

    /// Endpoint shapes for a morph pair
    #[inline]
    pub fn endpoints(&self, pair: ShapePair) -> (&Shape, &Shape) {
        let (a, b) = &self.pairs[pair.index()];
        (a, b)
    }

    /// True when measured JSON data replaced the embedded tables
    pub fn has_runtime_data(&self) -> bool {
        self.has_runtime_data
    }

    /// Restore the embedded tables
    pub fn load_fallback(&mut self) {
        self.pairs = EMBEDDED_PAIRS;
        self.has_runtime_data = false;
    }

    /// Load measured shapes from a directory containing the A and B files
    ///
    /// Both files must parse and each must carry at least three usable
    /// shapes, otherwise the bank reverts to the embedded tables and
    /// returns `Ok(false)`. Only I/O on an existing-but-unreadable file is
    /// an error.
    pub fn load_from_dir(&mut self, dir: &Path) -> ZmResult<bool> {
        let file_a = dir.join("audity_shapes_A_48k.json");
        let file_b = dir.join("audity_shapes_B_48k.json");

        if !file_a.is_file() || !file_b.is_file() {
            log::info!("shape files not found in {}, using embedded tables", dir.display());
            return Ok(false);
        }

        let loaded_a = match Self::parse_file(&file_a) {
            Ok(shapes) => shapes,
            Err(e) => {
                log::warn!("failed to parse {}: {e}, using embedded tables", file_a.display());
                self.load_fallback();
                return Ok(false);
            }
        };
        let loaded_b = match Self::parse_file(&file_b) {
            Ok(shapes) => shapes,
            Err(e) => {
                log::warn!("failed to parse {}: {e}, using embedded tables", file_b.display());
                self.load_fallback();
                return Ok(false);
            }
        };

        if loaded_a.len() < 3 || loaded_b.len() < 3 {
            log::warn!(
                "incomplete shape data ({} A, {} B), using embedded tables",
                loaded_a.len(),
                loaded_b.len()
            );
            self.load_fallback();
            return Ok(false);
        }

        for (i, shape) in loaded_a.into_iter().enumerate().take(4) {
            self.pairs[i].0 = shape;
        }
        for (i, shape) in loaded_b.into_iter().enumerate().take(4) {
            self.pairs[i].1 = shape;
        }

        self.has_runtime_data = true;
        log::info!("loaded measured shape data from {}", dir.display());
        Ok(true)
    }

    fn parse_file(path: &Path) -> ZmResult<Vec<Shape>> {
        let text = fs::read_to_string(path)?;
        let file: ShapeFile = serde_json::from_str(&text)?;

        let mut shapes = Vec::new();
        for entry in file.shapes.iter().take(4) {
            if entry.poles.len() != NUM_SECTIONS {
                return Err(ZmError::ShapeData(format!(
                    "expected {NUM_SECTIONS} poles per shape, got {}",
                    entry.poles.len()
                )));
            }
            let mut shape = Shape::default();
            for (slot, p) in shape.iter_mut().zip(entry.poles.iter()) {
                if !p.r.is_finite() || !p.theta.is_finite() {
                    return Err(ZmError::ShapeData("non-finite pole value".into()));
                }
                *slot = Pole::new(p.r, p.theta);
            }
            shapes.push(shape);
        }

        if shapes.is_empty() {
            return Err(ZmError::ShapeData("no shapes in file".into()));
        }
        Ok(shapes)
    }
}
