use std::io::Cursor;
use std::ops::Range;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use log::warn;
use plotters::prelude::*;
use crate::drivers::error::DriverError;
use crate::drivers::fft::FrequencySpectrum;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
        }
    }
}
/// One line on a chart.
struct Trace {
    label: String,
    color: RGBColor,
    points: Vec<(f64, f64)>,
}
/// Axes, title and traces of a single PNG.
struct Figure {
    title: String,
    x: Range<f64>,
    y: Range<f64>,
    traces: Vec<Trace>,
}
/// Draws the smoothed traces of every channel on a shared axis.
pub fn render_waveform_png(
    channels: &[Vec<f64>],
    labels: &[String],
    style: &PlotStyle,
) -> Result<Vec<u8>, DriverError> {
    let len = channels.first().map(|c| c.len()).unwrap_or(0);
    if len == 0 {
        return Err(DriverError::Plot("no samples to draw".into()));
    }
    let (lo, hi) = channels
        .iter()
        .flat_map(|c| c.iter().copied())
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let y = if (hi - lo).abs() < f64::EPSILON {
        -50.0..50.0
    } else {
        lo..hi
    };
    let traces = channels
        .iter()
        .enumerate()
        .map(|(idx, channel)| Trace {
            label: labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("Ch {}", idx + 1)),
            color: style.palette[idx % style.palette.len()],
            points: channel
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, v)| (i as f64, *v))
                .collect(),
        })
        .collect();
    let figure = Figure {
        title: "Smoothed EEG (uV)".to_string(),
        x: 0.0..len as f64,
        y,
        traces,
    };
    render(&figure, style)
}
/// Draws the magnitude spectrum, with the strongest bin in the title.
pub fn render_spectrum_png(
    spectrum: &FrequencySpectrum,
    style: &PlotStyle,
) -> Result<Vec<u8>, DriverError> {
    if spectrum.magnitudes.is_empty() {
        return Err(DriverError::Plot("spectrum has no magnitudes".into()));
    }
    let y_max = spectrum
        .magnitudes
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max)
        .max(1e-3);
    let title = match spectrum.peak_hz() {
        Some(peak) => format!("FFT magnitude, {} (peak {peak:.1} Hz)", spectrum.label),
        None => format!("FFT magnitude, {}", spectrum.label),
    };
    let figure = Figure {
        title,
        x: 0.0..spectrum.frequencies_hz.last().copied().unwrap_or(1.0).max(1.0),
        y: 0.0..y_max,
        traces: vec![Trace {
            label: spectrum.label.clone(),
            color: style.palette[0],
            points: spectrum
                .frequencies_hz
                .iter()
                .copied()
                .zip(spectrum.magnitudes.iter().copied())
                .collect(),
        }],
    };
    render(&figure, style)
}
fn render(figure: &Figure, style: &PlotStyle) -> Result<Vec<u8>, DriverError> {
    draw(figure, style, true).or_else(|e| {
        // No usable system font: keep the traces, drop the text.
        warn!("plot text unavailable ({e}), drawing without labels");
        draw(figure, style, false)
    })
}
fn draw(figure: &Figure, style: &PlotStyle, with_text: bool) -> Result<Vec<u8>, DriverError> {
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut builder = ChartBuilder::on(&root);
        builder.margin(10);
        if with_text {
            builder
                .caption(&figure.title, ("sans-serif", 20).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 45)
                .set_label_area_size(LabelAreaPosition::Bottom, 40);
        }
        let mut chart = builder.build_cartesian_2d(figure.x.clone(), figure.y.clone())?;
        if with_text {
            chart
                .configure_mesh()
                .light_line_style(&WHITE.mix(0.1))
                .draw()?;
        }
        for trace in &figure.traces {
            let color = trace.color;
            let series = chart.draw_series(LineSeries::new(trace.points.iter().copied(), &color))?;
            if with_text {
                series
                    .label(trace.label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
            }
        }
        if with_text && figure.traces.len() > 1 {
            chart
                .configure_series_labels()
                .border_style(&WHITE.mix(0.2))
                .background_style(&style.background)
                .draw()?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DriverError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| DriverError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fft::SpectrumBuilder;
    fn sample_channels() -> Vec<Vec<f64>> {
        vec![
            (0..250).map(|i| (i as f64 * 0.25).sin()).collect::<Vec<_>>(),
            vec![0.0; 250],
        ]
    }
    #[test]
    fn plotting_helpers_return_png() {
        let channels = sample_channels();
        let labels = vec!["Ch1".to_string(), "Ch2".to_string()];
        let wave = render_waveform_png(&channels, &labels, &PlotStyle::default()).unwrap();
        assert_eq!(&wave[1..4], b"PNG");
        let spectrum = SpectrumBuilder::with_size(250).compute(&channels[0], 250.0, "Ch1");
        let fft = render_spectrum_png(&spectrum, &PlotStyle::default()).unwrap();
        assert_eq!(&fft[1..4], b"PNG");
    }
    #[test]
    fn traces_render_without_text() {
        let channels = sample_channels();
        let figure = Figure {
            title: "untitled".into(),
            x: 0.0..250.0,
            y: -1.0..1.0,
            traces: vec![Trace {
                label: "Ch1".into(),
                color: RED,
                points: channels[0].iter().enumerate().map(|(i, v)| (i as f64, *v)).collect(),
            }],
        };
        let png = draw(&figure, &PlotStyle::default(), false).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
    #[test]
    fn empty_input_is_a_plot_error() {
        let err = render_waveform_png(&[], &[], &PlotStyle::default()).unwrap_err();
        assert!(matches!(err, DriverError::Plot(_)));
    }
}
