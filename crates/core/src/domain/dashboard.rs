// Sample Dashboard Snapshot
//
// Fixed, pre-baked analytics payload rendered before a user submits a profile.

use serde::Serialize;

const PROJECTION_DISPOSABLE_INCOME: f64 = 35_000.0;
const PROJECTION_SAVINGS_RATE: f64 = 0.15;
const PROJECTION_GROWTH: f64 = 1.005;
const PROJECTION_MONTHS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub charts: Charts,
    pub insights: Vec<&'static str>,
    pub options: Options,
    pub meta: Meta,
    pub sample_profile: SampleProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charts {
    pub scatter: Scatter,
    pub pie: LabeledSeries,
    pub bar: LabeledSeries,
    pub projection: Projection,
    pub heatmap: Heatmap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scatter {
    pub income: Vec<u32>,
    pub total_expenses: Vec<u32>,
    pub city_tier: Vec<&'static str>,
    pub savings_pct: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledSeries {
    pub labels: Vec<&'static str>,
    pub values: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub months: Vec<u32>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub labels: Vec<&'static str>,
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Options {
    pub occupations: Vec<&'static str>,
    pub city_tiers: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub records: u32,
}

/// Default profile shown on the dashboard. Field names follow the wire names
/// of the prediction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleProfile {
    #[serde(rename = "Income")]
    pub income: f64,
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "Dependents")]
    pub dependents: f64,
    #[serde(rename = "Occupation_encoded")]
    pub occupation_encoded: f64,
    #[serde(rename = "City_Tier_encoded")]
    pub city_tier_encoded: f64,
    #[serde(rename = "Total_Expenses")]
    pub total_expenses: f64,
    #[serde(rename = "Desired_Savings_Percentage")]
    pub desired_savings_percentage: f64,
    #[serde(rename = "Disposable_Income")]
    pub disposable_income: f64,
    #[serde(rename = "Occupation")]
    pub occupation: &'static str,
    #[serde(rename = "City_Tier")]
    pub city_tier: &'static str,
    pub source: &'static str,
}

impl DashboardSnapshot {
    pub fn sample() -> Self {
        Self {
            charts: Charts {
                scatter: Scatter {
                    income: vec![45000, 52000, 60000, 72000, 81000, 67000, 55000, 41000, 38000, 30000],
                    total_expenses: vec![
                        20000, 23000, 25000, 30000, 33000, 28000, 24000, 18000, 17000, 14000,
                    ],
                    city_tier: vec![
                        "Tier 1", "Tier 2", "Tier 2", "Tier 1", "Tier 3", "Tier 2", "Tier 1",
                        "Tier 3", "Tier 2", "Tier 1",
                    ],
                    savings_pct: vec![12, 14, 15, 16, 18, 15, 13, 11, 10, 9],
                },
                pie: LabeledSeries {
                    labels: vec![
                        "Rent",
                        "Loan_Repayment",
                        "Insurance",
                        "Groceries",
                        "Transport",
                        "Eating_Out",
                        "Entertainment",
                        "Utilities",
                        "Healthcare",
                        "Education",
                        "Miscellaneous",
                    ],
                    values: vec![9000, 2500, 1500, 5200, 2200, 1400, 1300, 2300, 1600, 2200, 800],
                },
                bar: LabeledSeries {
                    labels: vec!["Professional", "Self_Employed", "Student", "Retired"],
                    values: vec![31000, 29500, 22000, 18000],
                },
                projection: Projection::monthly_savings(),
                heatmap: Heatmap {
                    labels: vec![
                        "Income",
                        "Total_Expenses",
                        "Desired_Savings_Percentage",
                        "Disposable_Income",
                        "Dependents",
                    ],
                    matrix: vec![
                        vec![1.0, 0.82, 0.65, 0.91, -0.12],
                        vec![0.82, 1.0, 0.58, 0.42, -0.05],
                        vec![0.65, 0.58, 1.0, 0.71, 0.02],
                        vec![0.91, 0.42, 0.71, 1.0, -0.18],
                        vec![-0.12, -0.05, 0.02, -0.18, 1.0],
                    ],
                },
            },
            insights: vec![
                "Sample household allocates 42% of income to rent and necessities.",
                "Savings rate fixed at 15%.",
                "Disposable income of ₹35,000 keeps overspend risk low.",
                "Upgrade the inputs to see personalized notebook predictions.",
            ],
            options: Options {
                occupations: vec!["Salaried", "Professional", "Student", "Self_Employed"],
                city_tiers: vec!["Tier 1", "Tier 2", "Tier 3"],
            },
            meta: Meta { records: 1 },
            sample_profile: SampleProfile::default_profile(),
        }
    }
}

impl Projection {
    fn monthly_savings() -> Self {
        let months: Vec<u32> = (1..=PROJECTION_MONTHS).collect();
        let values = months
            .iter()
            .map(|&m| {
                let raw = PROJECTION_DISPOSABLE_INCOME
                    * PROJECTION_SAVINGS_RATE
                    * f64::from(m)
                    * PROJECTION_GROWTH;
                (raw * 100.0).round() / 100.0
            })
            .collect();
        Self { months, values }
    }
}

impl SampleProfile {
    fn default_profile() -> Self {
        Self {
            income: 60000.0,
            age: 30.0,
            dependents: 1.0,
            occupation_encoded: 1.0,
            city_tier_encoded: 1.0,
            total_expenses: 25000.0,
            desired_savings_percentage: 15.0,
            disposable_income: 35000.0,
            occupation: "Salaried",
            city_tier: "Tier 2",
            source: "step_7_notebook",
        }
    }
}
