pub mod clock_query_hydrator;
pub mod line_valuation_hydrator;
pub mod quotation_line_source;
pub mod recalculation_log_side_effect;
