//! Named evasion patches registered before any page script runs.
//!
//! Each patch is wrapped in its own `try` block. A throw inside one patch
//! never stops the others.

use serde_json::json;

use crate::modules::spoofing::FingerprintNoise;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvasionPatch {
    /// `navigator.webdriver` reads as `undefined`.
    WebdriverFlag,
    /// Non-empty `navigator.plugins`.
    Plugins,
    /// `navigator.languages` pinned to the launch locale.
    Languages,
    /// Removes the `cdc_` globals left behind by chromedriver-style tooling.
    AutomationGlobals,
    /// Provides the `window.chrome` object headful Chrome exposes.
    ChromeRuntime,
    /// Notification permission queries answer like a real browser.
    Permissions,
    /// Bounded per-attempt noise on canvas pixel reads.
    CanvasNoise,
    /// WebGL vendor/renderer strings.
    WebglIdentity,
    /// Bounded per-attempt noise on audio sample reads.
    AudioNoise,
}

impl EvasionPatch {
    pub const ALL: [EvasionPatch; 9] = [
        EvasionPatch::WebdriverFlag,
        EvasionPatch::Plugins,
        EvasionPatch::Languages,
        EvasionPatch::AutomationGlobals,
        EvasionPatch::ChromeRuntime,
        EvasionPatch::Permissions,
        EvasionPatch::CanvasNoise,
        EvasionPatch::WebglIdentity,
        EvasionPatch::AudioNoise,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EvasionPatch::WebdriverFlag => "webdriver_flag",
            EvasionPatch::Plugins => "plugins",
            EvasionPatch::Languages => "languages",
            EvasionPatch::AutomationGlobals => "automation_globals",
            EvasionPatch::ChromeRuntime => "chrome_runtime",
            EvasionPatch::Permissions => "permissions",
            EvasionPatch::CanvasNoise => "canvas_noise",
            EvasionPatch::WebglIdentity => "webgl_identity",
            EvasionPatch::AudioNoise => "audio_noise",
        }
    }

    fn body(&self, noise: &FingerprintNoise) -> String {
        match self {
            EvasionPatch::WebdriverFlag => {
                "Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined });"
                    .to_string()
            }
            EvasionPatch::Plugins => {
                "Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });"
                    .to_string()
            }
            EvasionPatch::Languages => {
                "Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });"
                    .to_string()
            }
            EvasionPatch::AutomationGlobals => r#"
for (const key of Object.keys(window)) {
    if (key.startsWith('cdc_') || key.startsWith('$cdc_')) { delete window[key]; }
}"#
            .to_string(),
            EvasionPatch::ChromeRuntime => r#"
if (!window.chrome) {
    window.chrome = { runtime: {}, loadTimes: function () {}, csi: function () {}, app: {} };
}"#
            .to_string(),
            EvasionPatch::Permissions => r#"
const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
window.navigator.permissions.query = (parameters) => (
    parameters && parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters)
);"#
            .to_string(),
            EvasionPatch::CanvasNoise => {
                let shift = json!(noise.canvas_shift);
                let seed = noise.canvas_seed;
                format!(
                    r#"
const shift = {shift};
const seed = {seed};
const originalGetImageData = CanvasRenderingContext2D.prototype.getImageData;
CanvasRenderingContext2D.prototype.getImageData = function (...args) {{
    const image = originalGetImageData.apply(this, args);
    const data = image.data;
    for (let i = (seed % 97) * 4; i < data.length; i += 397 * 4) {{
        data[i] = Math.min(255, data[i] + shift[0]);
        data[i + 1] = Math.min(255, data[i + 1] + shift[1]);
        data[i + 2] = Math.min(255, data[i + 2] + shift[2]);
    }}
    return image;
}};
const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
HTMLCanvasElement.prototype.toDataURL = function (...args) {{
    const ctx = this.getContext('2d');
    if (!ctx || this.width === 0 || this.height === 0) {{
        return originalToDataURL.apply(this, args);
    }}
    const original = originalGetImageData.call(ctx, 0, 0, 1, 1);
    const shifted = new ImageData(new Uint8ClampedArray(original.data), 1, 1);
    shifted.data[0] = Math.min(255, shifted.data[0] + shift[0]);
    ctx.putImageData(shifted, 0, 0);
    try {{
        return originalToDataURL.apply(this, args);
    }} finally {{
        ctx.putImageData(original, 0, 0);
    }}
}};"#
                )
            }
            EvasionPatch::WebglIdentity => {
                let vendor = json!(noise.webgl_vendor);
                let renderer = json!(noise.webgl_renderer);
                format!(
                    r#"
const vendor = {vendor};
const renderer = {renderer};
for (const proto of [WebGLRenderingContext.prototype, window.WebGL2RenderingContext && WebGL2RenderingContext.prototype]) {{
    if (!proto) continue;
    const originalGetParameter = proto.getParameter;
    proto.getParameter = function (parameter) {{
        if (parameter === 37445) return vendor;
        if (parameter === 37446) return renderer;
        return originalGetParameter.call(this, parameter);
    }};
}}"#
                )
            }
            EvasionPatch::AudioNoise => {
                let offset = noise.audio_noise;
                format!(
                    r#"
const offset = {offset:e};
const originalGetChannelData = AudioBuffer.prototype.getChannelData;
AudioBuffer.prototype.getChannelData = function (...args) {{
    const samples = originalGetChannelData.apply(this, args);
    for (let i = 0; i < samples.length; i += 100) {{ samples[i] += offset; }}
    return samples;
}};
const originalGetFloat = AnalyserNode.prototype.getFloatFrequencyData;
AnalyserNode.prototype.getFloatFrequencyData = function (array) {{
    originalGetFloat.call(this, array);
    for (let i = 0; i < array.length; i += 10) {{ array[i] += offset; }}
}};"#
                )
            }
        }
    }

    /// Self-contained snippet for this patch.
    pub fn source(&self, noise: &FingerprintNoise) -> String {
        format!(
            "(() => {{ try {{ {} }} catch (e) {{ /* {} */ }} }})();",
            self.body(noise),
            self.name()
        )
    }
}

/// Concatenate `patches` into the single init script registered on a page.
pub fn compose_evasion_script(patches: &[EvasionPatch], noise: &FingerprintNoise) -> String {
    patches
        .iter()
        .map(|patch| patch.source(noise))
        .collect::<Vec<_>>()
        .join("\n")
}
