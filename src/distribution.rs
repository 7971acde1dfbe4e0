use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 5] = [
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::F,
    ];

    /// Bucket for a final score. Anything at or above 90 is an A; scores that
    /// compare false against every threshold (NaN) land in F.
    pub fn for_score(score: f64) -> LetterGrade {
        if score >= 90.0 {
            LetterGrade::A
        } else if score >= 80.0 {
            LetterGrade::B
        } else if score >= 70.0 {
            LetterGrade::C
        } else if score >= 60.0 {
            LetterGrade::D
        } else {
            LetterGrade::F
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LetterGrade::A => "A (90-100)",
            LetterGrade::B => "B (80-89)",
            LetterGrade::C => "C (70-79)",
            LetterGrade::D => "D (60-69)",
            LetterGrade::F => "F (<60)",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Letter-grade counts, serialized as an ordered label → count map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Distribution {
    counts: [usize; 5],
}

impl Distribution {
    pub fn get(&self, grade: LetterGrade) -> usize {
        self.counts[grade.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// No scores were classified.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (LetterGrade, usize)> + '_ {
        LetterGrade::ALL.iter().map(|grade| (*grade, self.get(*grade)))
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LetterGrade::ALL.len()))?;
        for (grade, count) in self.iter() {
            map.serialize_entry(grade.label(), &count)?;
        }
        map.end()
    }
}

pub fn classify(scores: &[f64]) -> Distribution {
    let mut distribution = Distribution::default();
    for score in scores {
        distribution.counts[LetterGrade::for_score(*score).index()] += 1;
    }
    distribution
}
