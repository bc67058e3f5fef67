//! The pool of trivia appended to every reply.

use rand::Rng;
use rand::seq::IndexedRandom;

const LEBRON_FACTS: &[&str] = &[
    "LeBron James was born on December 30, 1984, in Akron, Ohio.",
    "LeBron starred at St. Vincent-St. Mary High School, where his games were nationally televised as a teenager.",
    "He was the #1 pick in the 2003 NBA Draft by the Cleveland Cavaliers.",
    "LeBron is a four-time NBA champion (2012, 2013 with the Miami Heat; 2016 with the Cleveland Cavaliers; 2020 with the Los Angeles Lakers).",
    "In 2016, LeBron led the Cavaliers to come back from down 3-1 in the NBA Finals against the 73-9 Golden State Warriors, the greatest regular-season team of all time.",
    "He's the only player in NBA history to lead both teams in all five major statistical categories in an NBA Finals series (2016).",
    "LeBron has been named NBA Finals MVP four times.",
    "He's a four-time regular season MVP (2009, 2010, 2012, 2013).",
    "In February 2023, LeBron passed Kareem Abdul-Jabbar to become the NBA's all-time leading scorer.",
    "He's made 10 NBA Finals appearances across three different decades.",
    "He won Rookie of the Year in 2004 after averaging over 20 points per game as a teenager.",
    "LeBron is the only player to score 40,000+ career points and still counting.",
    "He's a two-time Olympic gold medalist (2008 in Beijing, 2012 in London).",
    "LeBron's 2018 Game 1 Finals performance (51-8-8) is one of the most dominant in playoff history.",
    "He founded the I PROMISE School in Akron, Ohio, to support at-risk children and their families.",
    "LeBron's nickname is 'King James,' and his signature celebration is 'The Silencer.'",
    "He's known for his remarkable basketball IQ and passing ability, often called 'Point LeBron.'",
    "LeBron is one of the few players to record a triple-double against all 30 NBA teams.",
    "He's the all-time leader in playoff points and minutes played.",
    "He has played with and against both Kobe Bryant and Stephen Curry during his career.",
    "LeBron starred in the movie 'Space Jam: A New Legacy' (2021).",
    "He's worn both #23 and #6 throughout his career, honoring Michael Jordan and Julius Erving.",
    "LeBron has invested in multiple businesses, including Blaze Pizza and SpringHill Entertainment.",
    "He was the youngest player ever to score 30,000 career points.",
    "LeBron averages nearly 27 points, 7 rebounds, and 7 assists over his entire career.",
    "LeBron's motto: 'Strive for Greatness.'",
    "He's still going strong in his 21st NBA season, continuing to break records.",
    "He once promised Cleveland, 'I'm bringing a championship to this city,' and he delivered in 2016.",
    "LeBron's chase-down block on Andre Iguodala in Game 7 of the 2016 Finals is one of the greatest defensive plays in NBA history.",
    "He was named to the NBA's 75th Anniversary Team in 2021.",
    "He is the first player in NBA history to reach 10,000+ points, rebounds, and assists combined.",
    "He's the only player to achieve a triple-double in the NBA Finals with three different teams.",
];

/// An immutable set of facts. Selection takes the random source as an
/// argument so it can be seeded in tests.
#[derive(Clone, Copy, Debug)]
pub struct FactPool {
    facts: &'static [&'static str],
}

impl Default for FactPool {
    fn default() -> Self {
        Self {
            facts: LEBRON_FACTS,
        }
    }
}

impl FactPool {
    pub fn new(facts: &'static [&'static str]) -> Self {
        Self { facts }
    }

    pub fn facts(&self) -> &'static [&'static str] {
        self.facts
    }

    /// Pick one fact uniformly at random. An empty pool yields "".
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.facts.choose(rng).copied().unwrap_or_default()
    }

    /// The text stored as message metadata for a turn.
    pub fn supplement<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        format!("Also, {}", self.pick(rng))
    }
}
