use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Results of a mass balance run.
///
/// Bin-resolved arrays have one row per elevation bin. Monthly arrays have one column per
/// model month, annual arrays one column per model year, and geometry arrays one column per
/// year plus a final column holding the geometry after the last year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceOutput {
    /// Air temperature (degC)
    pub temp: Array2<f64>,
    /// Liquid precipitation (m)
    pub prec: Array2<f64>,
    /// Solid precipitation (m w.e.)
    pub acc: Array2<f64>,
    /// Refreezing (m w.e.)
    pub refreeze: Array2<f64>,
    /// Snowpack at the end of the month (m w.e.)
    pub snowpack: Array2<f64>,
    /// Melt of snow, firn and ice (m w.e.)
    pub melt: Array2<f64>,
    /// Frontal ablation (m w.e.)
    pub frontal_ablation: Array2<f64>,
    /// Climatic mass balance (m w.e.)
    pub massbalclim: Array2<f64>,

    /// Annual climatic mass balance (m w.e.)
    pub massbalclim_annual: Array2<f64>,
    /// Area at the start of each year (km^2)
    pub area_annual: Array2<f64>,
    /// Ice thickness at the start of each year (m)
    pub thickness_annual: Array2<f64>,
    /// Width at the start of each year (km)
    pub width_annual: Array2<f64>,
    /// Surface type during each year, see [`super::SurfaceType`]
    pub surfacetype_annual: Array2<u8>,

    /// Glacier-wide mass balance (m w.e.)
    pub massbaltotal: Array1<f64>,
    /// Runoff (m^3)
    pub runoff: Array1<f64>,
    /// Elevation of the snow line (m a.s.l.)
    pub snowline: Array1<f64>,
    /// Glacier-wide snowpack (km^3 w.e.)
    pub snowpack_total: Array1<f64>,

    /// Glacier area at the start of each year plus after the final year (km^2)
    pub area: Array1<f64>,
    /// Glacier volume at the start of each year plus after the final year (km^3)
    pub volume: Array1<f64>,
    /// Equilibrium line altitude of each year (m a.s.l.)
    pub ela: Array1<f64>,
}

impl MassBalanceOutput {
    pub(crate) fn zeros(n_bins: usize, n_months: usize) -> Self {
        let n_years = n_months / 12;
        Self {
            temp: Array2::zeros((n_bins, n_months)),
            prec: Array2::zeros((n_bins, n_months)),
            acc: Array2::zeros((n_bins, n_months)),
            refreeze: Array2::zeros((n_bins, n_months)),
            snowpack: Array2::zeros((n_bins, n_months)),
            melt: Array2::zeros((n_bins, n_months)),
            frontal_ablation: Array2::zeros((n_bins, n_months)),
            massbalclim: Array2::zeros((n_bins, n_months)),
            massbalclim_annual: Array2::zeros((n_bins, n_years)),
            area_annual: Array2::zeros((n_bins, n_years + 1)),
            thickness_annual: Array2::zeros((n_bins, n_years + 1)),
            width_annual: Array2::zeros((n_bins, n_years + 1)),
            surfacetype_annual: Array2::zeros((n_bins, n_years)),
            massbaltotal: Array1::zeros(n_months),
            runoff: Array1::zeros(n_months),
            snowline: Array1::from_elem(n_months, f64::NAN),
            snowpack_total: Array1::zeros(n_months),
            area: Array1::zeros(n_years + 1),
            volume: Array1::zeros(n_years + 1),
            ela: Array1::from_elem(n_years, f64::NAN),
        }
    }

    pub fn n_months(&self) -> usize {
        self.massbaltotal.len()
    }

    pub fn n_years(&self) -> usize {
        self.ela.len()
    }

    /// Mean glacier-wide mass balance rate between two months (m w.e. a^-1).
    ///
    /// # Arguments
    ///
    /// * `t1_idx` - First month (inclusive)
    /// * `t2_idx` - Last month (exclusive), clamped to the run length
    /// * `years` - Length of the period in years
    pub fn mb_mwea(&self, t1_idx: usize, t2_idx: usize, years: f64) -> f64 {
        let t2_idx = t2_idx.min(self.n_months());
        if t1_idx >= t2_idx || years <= 0.0 {
            return f64::NAN;
        }
        self.massbaltotal.slice(s![t1_idx..t2_idx]).sum() / years
    }

    /// Glacier-wide mass balance of each year (m w.e.).
    pub fn annual_massbaltotal(&self) -> Array1<f64> {
        self.massbaltotal
            .exact_chunks(12)
            .into_iter()
            .map(|year| year.sum())
            .collect()
    }

    /// Glacier-wide runoff of each year (m^3).
    pub fn annual_runoff(&self) -> Array1<f64> {
        self.runoff
            .exact_chunks(12)
            .into_iter()
            .map(|year| year.sum())
            .collect()
    }

    /// Drop the first `years` years of the run.
    ///
    /// Used to remove spinup years before results are reported.
    pub fn without_spinup(&self, years: usize) -> Self {
        let years = years.min(self.n_years());
        let months = years * 12;
        let monthly = |a: &Array2<f64>| a.slice(s![.., months..]).to_owned();

        Self {
            temp: monthly(&self.temp),
            prec: monthly(&self.prec),
            acc: monthly(&self.acc),
            refreeze: monthly(&self.refreeze),
            snowpack: monthly(&self.snowpack),
            melt: monthly(&self.melt),
            frontal_ablation: monthly(&self.frontal_ablation),
            massbalclim: monthly(&self.massbalclim),
            massbalclim_annual: self.massbalclim_annual.slice(s![.., years..]).to_owned(),
            area_annual: self.area_annual.slice(s![.., years..]).to_owned(),
            thickness_annual: self.thickness_annual.slice(s![.., years..]).to_owned(),
            width_annual: self.width_annual.slice(s![.., years..]).to_owned(),
            surfacetype_annual: self.surfacetype_annual.slice(s![.., years..]).to_owned(),
            massbaltotal: self.massbaltotal.slice(s![months..]).to_owned(),
            runoff: self.runoff.slice(s![months..]).to_owned(),
            snowline: self.snowline.slice(s![months..]).to_owned(),
            snowpack_total: self.snowpack_total.slice(s![months..]).to_owned(),
            area: self.area.slice(s![years..]).to_owned(),
            volume: self.volume.slice(s![years..]).to_owned(),
            ela: self.ela.slice(s![years..]).to_owned(),
        }
    }

    /// Total climatic mass balance of each bin over the run (m w.e.).
    pub fn cumulative_massbalclim(&self) -> Array1<f64> {
        self.massbalclim.sum_axis(Axis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn output_with_monthly_mb(values: &[f64]) -> MassBalanceOutput {
        let mut output = MassBalanceOutput::zeros(2, values.len());
        output.massbaltotal = Array1::from(values.to_vec());
        output
    }

    #[test]
    fn annual_sums() {
        let values: Vec<f64> = (0..24).map(|i| if i < 12 { 0.1 } else { -0.2 }).collect();
        let output = output_with_monthly_mb(&values);

        let annual = output.annual_massbaltotal();
        assert_eq!(annual.len(), 2);
        assert_relative_eq!(annual[0], 1.2, epsilon = 1e-12);
        assert_relative_eq!(annual[1], -2.4, epsilon = 1e-12);
    }

    #[test]
    fn mass_balance_rate() {
        let values: Vec<f64> = (0..24).map(|i| if i < 12 { 0.1 } else { -0.2 }).collect();
        let output = output_with_monthly_mb(&values);

        assert_relative_eq!(output.mb_mwea(0, 24, 2.0), -0.6, epsilon = 1e-12);
        assert_relative_eq!(output.mb_mwea(12, 100, 1.0), -2.4, epsilon = 1e-12);
        assert!(output.mb_mwea(12, 12, 1.0).is_nan());
    }

    #[test]
    fn spinup_removed() {
        let values: Vec<f64> = (0..36).map(|i| i as f64).collect();
        let output = output_with_monthly_mb(&values).without_spinup(1);

        assert_eq!(output.n_months(), 24);
        assert_eq!(output.n_years(), 2);
        assert_eq!(output.massbaltotal[0], 12.0);
        assert_eq!(output.area.len(), 3);
        assert_eq!(output.temp.dim(), (2, 24));
        assert_eq!(output.area_annual.dim(), (2, 3));
    }
}
