//! Solver configuration.
//!
//! All options are integer valued (booleans as 0/1, percentages as their integer value) and
//! registered by name, so that embedded `c --name=value` DIMACS comments and the public
//! `set_option` API share one typed registry. Unknown names and out of range values are
//! rejected.

use thiserror::Error;

/// Errors reported when setting options by name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("value {value} for option '{name}' outside of range {min}..={max}")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("unknown configuration '{0}'")]
    UnknownConfiguration(String),
}

macro_rules! options {
    (
        $(#[$struct_attr:meta])*
        pub struct $struct_name:ident {
            $(
                $(#[doc = $doc:literal])*
                pub $field:ident: i64 = $default:expr; [$min:expr, $max:expr]
            )*
        }
    ) => {
        $(#[$struct_attr])*
        pub struct $struct_name {
            $(
                $(#[doc = $doc])*
                pub $field: i64,
            )*
        }

        impl Default for $struct_name {
            fn default() -> $struct_name {
                $struct_name {
                    $($field: $default,)*
                }
            }
        }

        impl $struct_name {
            /// Look up an option value by name.
            pub fn get_option(&self, name: &str) -> Result<i64, ConfigError> {
                match name {
                    $(stringify!($field) => Ok(self.$field),)*
                    _ => Err(ConfigError::UnknownOption(name.to_owned())),
                }
            }

            /// Set an option by name, checking its range.
            pub fn set_option(&mut self, name: &str, value: i64) -> Result<(), ConfigError> {
                match name {
                    $(
                        stringify!($field) => {
                            if value < $min || value > $max {
                                return Err(ConfigError::OutOfRange {
                                    name: name.to_owned(),
                                    value,
                                    min: $min,
                                    max: $max,
                                });
                            }
                            self.$field = value;
                            Ok(())
                        }
                    )*
                    _ => Err(ConfigError::UnknownOption(name.to_owned())),
                }
            }

            /// Names of all registered options.
            pub fn option_names() -> &'static [&'static str] {
                &[$(stringify!($field)),*]
            }
        }
    };
}

options! {
    /// Configurable parameters used during solving.
    pub struct SolverConfig {
        /// Allow chronological backtracking. (Default: 1)
        pub chrono: i64 = 1; [0, 1]
        /// Backjump distance above which backtracking stays chronological. (Default: 100)
        pub chronolevels: i64 = 100; [1, 1 << 20]
        /// Alternate between stable and unstable search modes. (Default: 1)
        pub stabilize: i64 = 1; [0, 1]
        /// Base tick budget of a stabilization phase, as a power of two. (Default: 24)
        pub stabilizeticks: i64 = 24; [10, 40]
        /// Growth factor of stabilization phases in percent. (Default: 200)
        pub stabilizefactor: i64 = 200; [101, 1000]
        /// Base conflict interval between restarts in unstable mode. (Default: 2)
        pub restartint: i64 = 2; [1, 1 << 16]
        /// Restart when the fast glue average exceeds the slow one by this percentage. (Default: 10)
        pub restartmargin: i64 = 10; [0, 100]
        /// Scaling factor for reluctant doubling restarts in stable mode. (Default: 1024)
        pub reluctantint: i64 = 1024; [1, 1 << 20]
        /// Reuse the matching trail prefix when restarting. (Default: 1)
        pub restartreusetrail: i64 = 1; [0, 1]
        /// Base conflict interval between clause database reductions. (Default: 300)
        pub reduceint: i64 = 300; [10, 1 << 20]
        /// Shape of the reduce schedule: 0 arithmetic, 1 geometric, 2 luby. (Default: 0)
        pub reduceshape: i64 = 0; [0, 2]
        /// Percentage of reduction candidates that are collected. (Default: 75)
        pub reducetarget: i64 = 75; [10, 100]
        /// Largest glue of tier one clauses, which are always kept. (Default: 2)
        pub tier1glue: i64 = 2; [1, 100]
        /// Largest glue of tier two clauses. (Default: 6)
        pub tier2glue: i64 = 6; [1, 1000]
        /// Base conflict interval between rephasing rounds. (Default: 1000)
        pub rephaseint: i64 = 1000; [10, 1 << 24]
        /// Enable saving phases of assigned variables. (Default: 1)
        pub phasesaving: i64 = 1; [0, 1]
        /// Use target phases during stable mode. (Default: 1)
        pub target: i64 = 1; [0, 2]
        /// Initial phase for unseen variables. (Default: 1)
        pub initialphase: i64 = 1; [0, 1]
        /// Enable local search to improve the best phases. (Default: 1)
        pub walk: i64 = 1; [0, 1]
        /// Relative effort of local search in per mille of search ticks. (Default: 50)
        pub walkeffort: i64 = 50; [0, 1000]
        /// Enable recursive learned clause minimization. (Default: 1)
        pub minimize: i64 = 1; [0, 1]
        /// Maximum recursion depth of clause minimization. (Default: 1000)
        pub minimizedepth: i64 = 1000; [1, 1 << 20]
        /// Enable trail-segment shrinking of learned clauses. (Default: 1)
        pub shrink: i64 = 1; [0, 1]
        /// Enable on-the-fly subsumption during conflict analysis. (Default: 1)
        pub otfs: i64 = 1; [0, 1]
        /// EVSIDS score decay in per mille. (Default: 950)
        pub scoredecay: i64 = 950; [500, 999]
        /// Base conflict interval between inprocessing rounds. (Default: 2000)
        pub inprocessint: i64 = 2000; [100, 1 << 24]
        /// Enable deduplication of binary clauses. (Default: 1)
        pub dedup: i64 = 1; [0, 1]
        /// Enable SCC decomposition and equivalent literal substitution. (Default: 1)
        pub decompose: i64 = 1; [0, 1]
        /// Number of decompose iterations per inprocessing round. (Default: 2)
        pub decomposerounds: i64 = 2; [1, 16]
        /// Enable ternary resolution. (Default: 1)
        pub ternary: i64 = 1; [0, 1]
        /// Relative effort of ternary resolution in per mille. (Default: 100)
        pub ternaryeffort: i64 = 100; [0, 1000]
        /// Enable failed literal probing. (Default: 1)
        pub probe: i64 = 1; [0, 1]
        /// Enable hyper binary resolution during probing. (Default: 1)
        pub probehbr: i64 = 1; [0, 1]
        /// Relative effort of probing in per mille. (Default: 100)
        pub probeeffort: i64 = 100; [0, 1000]
        /// Enable transitive reduction of the binary implication graph. (Default: 1)
        pub transred: i64 = 1; [0, 1]
        /// Relative effort of transitive reduction in per mille. (Default: 100)
        pub transredeffort: i64 = 100; [0, 1000]
        /// Enable bounded variable elimination. (Default: 1)
        pub elim: i64 = 1; [0, 1]
        /// Maximum allowed growth of clauses per eliminated variable. (Default: 0)
        pub elimboundgrow: i64 = 0; [0, 1 << 10]
        /// Occurrence list limit of the fast elimination variant. (Default: 100)
        pub elimocclim: i64 = 100; [1, 1 << 20]
        /// Clause size limit of the fast elimination variant. (Default: 100)
        pub elimclslim: i64 = 100; [1, 1 << 20]
        /// Enable gate recognition during elimination. (Default: 1)
        pub elimgates: i64 = 1; [0, 1]
        /// Relative effort of elimination in per mille. (Default: 200)
        pub elimeffort: i64 = 200; [0, 1000]
        /// Enable clause vivification. (Default: 1)
        pub vivify: i64 = 1; [0, 1]
        /// Relative effort of vivification in per mille. (Default: 100)
        pub vivifyeffort: i64 = 100; [0, 1000]
        /// Enable bounded variable addition. (Default: 1)
        pub factor: i64 = 1; [0, 1]
        /// Minimum number of clause pairs a factored literal pair must cover. (Default: 4)
        pub factormin: i64 = 4; [2, 1 << 10]
        /// Relative effort of bounded variable addition in per mille. (Default: 50)
        pub factoreffort: i64 = 50; [0, 1000]
        /// Enable congruence closure of extracted gates. (Default: 1)
        pub congruence: i64 = 1; [0, 1]
        /// Enable backbone and equivalence sweeping. (Default: 1)
        pub sweep: i64 = 1; [0, 1]
        /// Relative effort of sweeping in per mille. (Default: 100)
        pub sweepeffort: i64 = 100; [0, 1000]
        /// Initial variable limit of a sweeping environment. (Default: 128)
        pub sweepvars: i64 = 128; [16, 1 << 20]
        /// Initial clause limit of a sweeping environment. (Default: 1024)
        pub sweepclauses: i64 = 1024; [16, 1 << 24]
        /// Initial depth limit of a sweeping environment. (Default: 2)
        pub sweepdepth: i64 = 2; [1, 16]
        /// Enable blocked clause elimination. (Default: 1)
        pub block: i64 = 1; [0, 1]
        /// Occurrence list limit of blocked clause elimination. (Default: 100)
        pub blockocclim: i64 = 100; [1, 1 << 20]
        /// Enable internal variable compaction. (Default: 1)
        pub compact: i64 = 1; [0, 1]
        /// Compact once this percentage of internal variables is inactive. (Default: 50)
        pub compactlim: i64 = 50; [1, 100]
        /// Seed of the pseudo random number generator. (Default: 0)
        pub seed: i64 = 0; [0, i64::max_value()]
        /// Mark clauses derived by VeriPB tracing for checked deletion. (Default: 0)
        pub checkeddeletions: i64 = 0; [0, 1]
    }
}

impl SolverConfig {
    /// Apply one of the bundled option sets.
    pub fn configure(&mut self, name: &str) -> Result<(), ConfigError> {
        match name {
            "default" => {
                *self = SolverConfig::default();
            }
            "plain" => {
                *self = SolverConfig::default();
                for &pass in [
                    "dedup",
                    "decompose",
                    "ternary",
                    "probe",
                    "transred",
                    "elim",
                    "vivify",
                    "factor",
                    "congruence",
                    "sweep",
                    "block",
                    "walk",
                    "compact",
                ]
                .iter()
                {
                    self.set_option(pass, 0).unwrap();
                }
            }
            "sat" => {
                *self = SolverConfig::default();
                self.target = 2;
                self.restartint = 50;
                self.rephaseint = 500;
            }
            "unsat" => {
                *self = SolverConfig::default();
                self.target = 0;
                self.stabilize = 0;
                self.walk = 0;
            }
            _ => return Err(ConfigError::UnknownConfiguration(name.to_owned())),
        }
        Ok(())
    }

    /// The EVSIDS decay factor as a float.
    pub fn score_decay_factor(&self) -> f64 {
        self.scoredecay as f64 / 1000.0
    }

    /// The restart margin as a factor applied to the slow glue average.
    pub fn restart_margin_factor(&self) -> f64 {
        1.0 + self.restartmargin as f64 / 100.0
    }
}

/// Incremental update of a solver configuration.
#[derive(Default)]
pub struct SolverConfigUpdate {
    changed: Vec<(String, i64)>,
}

impl SolverConfigUpdate {
    pub fn new() -> SolverConfigUpdate {
        SolverConfigUpdate::default()
    }

    pub fn set(&mut self, name: &str, value: i64) {
        self.changed.push((name.to_owned(), value));
    }

    pub fn apply(&self, config: &mut SolverConfig) -> Result<(), ConfigError> {
        for (name, value) in self.changed.iter() {
            config.set_option(name, *value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let config = SolverConfig::default();
        for &name in SolverConfig::option_names() {
            let value = config.get_option(name).unwrap();
            let mut copy = SolverConfig::default();
            copy.set_option(name, value).unwrap();
        }
    }

    #[test]
    fn unknown_option_fails() {
        let mut config = SolverConfig::default();
        assert_eq!(
            config.set_option("frobnicate", 1),
            Err(ConfigError::UnknownOption("frobnicate".to_owned()))
        );
    }

    #[test]
    fn out_of_range_fails() {
        let mut config = SolverConfig::default();
        match config.set_option("restartmargin", 1000) {
            Err(ConfigError::OutOfRange { .. }) => (),
            result => panic!("unexpected result {:?}", result),
        }
    }

    #[test]
    fn presets() {
        let mut config = SolverConfig::default();
        config.configure("plain").unwrap();
        assert_eq!(config.elim, 0);
        assert_eq!(config.stabilize, 1);

        config.configure("unsat").unwrap();
        assert_eq!(config.stabilize, 0);

        assert_eq!(
            config.configure("speedy"),
            Err(ConfigError::UnknownConfiguration("speedy".to_owned()))
        );
    }
}
