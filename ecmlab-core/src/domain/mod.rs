//! Domain types for the measure-preparation engine.

pub mod breakout;
pub mod choice;
pub mod key;
pub mod partition;
pub mod year;

pub use breakout::OutBreak;
pub use choice::ChoiceParams;
pub use key::{
    is_heat_cool_end_use, BldgSector, MsegKey, Scope, TechType, Vintage, HEAT_COOL_END_USES,
};
pub use partition::{
    AllMeasure, BaseEff, ContribMap, ContribRecord, CostMseg, FlowMseg, Lifetime, MasterMseg,
    MsegPartition, StockMseg,
};
pub use year::{Horizon, YearSeries};
