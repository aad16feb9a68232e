use std::collections::HashMap;

use prism_core::EntityKind;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Produces synthetic replacement values, one method per entity kind.
pub trait SurrogateGenerator: Send {
    /// Called before each new mapping is built. Generators whose output depends on
    /// what they produced earlier start over here.
    fn reset(&mut self) {}

    fn person(&mut self) -> String;
    fn location(&mut self) -> String;
    fn date_time(&mut self) -> String;
    fn email_address(&mut self) -> String;
    fn phone_number(&mut self) -> String;

    fn generate(&mut self, kind: EntityKind) -> String {
        match kind {
            EntityKind::Person => self.person(),
            EntityKind::Location => self.location(),
            EntityKind::DateTime => self.date_time(),
            EntityKind::EmailAddress => self.email_address(),
            EntityKind::PhoneNumber => self.phone_number(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakerLocale {
    PtBr,
    EnUs,
}

impl FakerLocale {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "pt_br" | "pt" => Some(Self::PtBr),
            "en_us" | "en" => Some(Self::EnUs),
            _ => None,
        }
    }
}

const PT_BR_FIRST_NAMES: &[&str] = &[
    "Alice", "Beatriz", "Bruno", "Caio", "Camila", "Daniela", "Davi", "Eduarda", "Enzo",
    "Felipe", "Gabriela", "Gustavo", "Heitor", "Helena", "Isabela", "Joaquim", "Larissa",
    "Leonardo", "Lívia", "Lorenzo", "Luana", "Manuela", "Matheus", "Natália", "Otávio",
    "Priscila", "Renata", "Samuel", "Thiago", "Valentina", "Vinícius", "Yasmin",
];
const PT_BR_LAST_NAMES: &[&str] = &[
    "Almeida", "Barbosa", "Cardoso", "Costa", "Duarte", "Ferreira", "Gomes", "Lima", "Martins",
    "Moreira", "Nogueira", "Pereira", "Ribeiro", "Rocha", "Teixeira",
];
const PT_BR_CITIES: &[&str] = &[
    "Aracaju", "Campinas", "Campo Grande", "Cuiabá", "Florianópolis", "Fortaleza", "Goiânia",
    "Joinville", "Londrina", "Maceió", "Manaus", "Natal", "Niterói", "Pelotas", "Ribeirão Preto",
    "Santos", "Sorocaba", "Teresina", "Uberlândia", "Vitória",
];
const EN_US_FIRST_NAMES: &[&str] = &[
    "Aaron", "Abigail", "Brandon", "Brianna", "Caleb", "Chloe", "Dylan", "Ella", "Ethan",
    "Grace", "Hunter", "Isaac", "Jasmine", "Kayla", "Logan", "Madison", "Nathan", "Paige",
    "Riley", "Sydney", "Tyler", "Zoe",
];
const EN_US_LAST_NAMES: &[&str] = &[
    "Anderson", "Brooks", "Carter", "Dawson", "Ellis", "Fisher", "Griffin", "Hayes", "Jenkins",
    "Morgan", "Porter", "Reed", "Sullivan", "Turner", "Walsh",
];
const EN_US_CITIES: &[&str] = &[
    "Akron", "Albany", "Boise", "Chattanooga", "Dayton", "Eugene", "Fresno", "Green Bay",
    "Lansing", "Lubbock", "Madison", "Omaha", "Provo", "Reno", "Savannah", "Spokane", "Tacoma",
    "Tulsa", "Wichita", "Yonkers",
];

/// Locale-flavoured fake data drawn from fixed pools.
pub struct LocaleFaker {
    locale: FakerLocale,
    rng: StdRng,
}

impl LocaleFaker {
    pub fn new(locale: FakerLocale) -> Self {
        Self {
            locale,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible output for a given seed.
    pub fn seeded(locale: FakerLocale, seed: u64) -> Self {
        Self {
            locale,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick(&mut self, pool: &[&'static str]) -> String {
        pool.choose(&mut self.rng)
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    fn first_names(&self) -> &'static [&'static str] {
        match self.locale {
            FakerLocale::PtBr => PT_BR_FIRST_NAMES,
            FakerLocale::EnUs => EN_US_FIRST_NAMES,
        }
    }

    fn last_names(&self) -> &'static [&'static str] {
        match self.locale {
            FakerLocale::PtBr => PT_BR_LAST_NAMES,
            FakerLocale::EnUs => EN_US_LAST_NAMES,
        }
    }
}

impl SurrogateGenerator for LocaleFaker {
    fn person(&mut self) -> String {
        let pool = self.first_names();
        self.pick(pool)
    }

    fn location(&mut self) -> String {
        let pool = match self.locale {
            FakerLocale::PtBr => PT_BR_CITIES,
            FakerLocale::EnUs => EN_US_CITIES,
        };
        self.pick(pool)
    }

    fn date_time(&mut self) -> String {
        let year = self.rng.gen_range(1950..=2010);
        let month = self.rng.gen_range(1..=12);
        let day = self.rng.gen_range(1..=28);
        format!("{year:04}-{month:02}-{day:02}")
    }

    fn email_address(&mut self) -> String {
        let first = self.first_names();
        let last = self.last_names();
        let first = self.pick(first).to_lowercase();
        let last = self.pick(last).to_lowercase();
        let suffix = self.rng.gen_range(1..100);
        let domain = match self.locale {
            FakerLocale::PtBr => "exemplo.com.br",
            FakerLocale::EnUs => "example.com",
        };
        format!("{first}.{last}{suffix}@{domain}")
    }

    fn phone_number(&mut self) -> String {
        let line = self.rng.gen_range(1000..10000);
        match self.locale {
            FakerLocale::PtBr => {
                let area = self.rng.gen_range(11..=99);
                let prefix = self.rng.gen_range(90000..100000);
                format!("+55 {area} {prefix}-{line}")
            }
            FakerLocale::EnUs => {
                let exchange = self.rng.gen_range(200..1000);
                format!("(555) {exchange}-{line}")
            }
        }
    }
}

/// `<PERSON_1>`, `<LOCATION_1>`, ... numbered per kind within one mapping.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderSurrogates {
    counters: HashMap<EntityKind, usize>,
}

impl PlaceholderSurrogates {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, kind: EntityKind) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("<{}_{}>", kind.as_str(), counter)
    }
}

impl SurrogateGenerator for PlaceholderSurrogates {
    fn reset(&mut self) {
        self.counters.clear();
    }

    fn person(&mut self) -> String {
        self.next(EntityKind::Person)
    }

    fn location(&mut self) -> String {
        self.next(EntityKind::Location)
    }

    fn date_time(&mut self) -> String {
        self.next(EntityKind::DateTime)
    }

    fn email_address(&mut self) -> String {
        self.next(EntityKind::EmailAddress)
    }

    fn phone_number(&mut self) -> String {
        self.next(EntityKind::PhoneNumber)
    }
}
