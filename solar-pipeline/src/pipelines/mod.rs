pub mod quotation_pricing;
