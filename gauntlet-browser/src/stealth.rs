use gauntlet_common::StealthLevel;

use crate::fingerprint::UserAgentProfile;

/// Chrome command-line arguments for a given stealth level and fingerprint.
pub fn build_stealth_arguments(level: &StealthLevel, profile: &UserAgentProfile) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-extensions".to_string(),
        "--disable-plugins-discovery".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--window-position=0,0".to_string(),
        format!("--user-agent={}", profile.user_agent),
        format!(
            "--window-size={},{}",
            profile.viewport.0, profile.viewport.1
        ),
        format!("--lang={}", profile.languages.join(",")),
    ];
    if let StealthLevel::Maximum = level {
        args.push("--disable-gpu".to_string());
    }
    args
}

/// JavaScript evasions applied after navigation to reduce automation
/// signals. Split per level so the lightest profile stays cheap.
pub struct StealthScripts;

impl StealthScripts {
    pub fn core_evasions() -> &'static str {
        r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'plugins', { get: () => [1,2,3] });
            Object.defineProperty(navigator, 'languages', {
                get: () => ['en-US', 'en']
            });
            if (!window.chrome) window.chrome = { runtime: {} };
        "#
    }

    pub fn canvas_evasions() -> &'static str {
        r#"
            const getContext = HTMLCanvasElement.prototype.getContext;
            HTMLCanvasElement.prototype.getContext = function(type,...args){
                const ctx = getContext.call(this,type,...args);
                if(type==='2d' && ctx) {
                    const origToDataURL=this.toDataURL;
                    this.toDataURL=function(...a){
                        const imgdata=ctx.getImageData(0,0,this.width,this.height);
                        for(let i=0;i<imgdata.data.length;i+=4){
                            if(Math.random()<0.001)imgdata.data[i]+=Math.random()<0.5?-1:1;
                        }
                        ctx.putImageData(imgdata,0,0);
                        return origToDataURL.call(this,...a);
                    };
                }
                return ctx;
            };
        "#
    }

    pub fn webgl_evasions() -> &'static str {
        r#"
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function(parameter) {
                if (parameter === 37445) return 'Intel Inc.';
                if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                return getParameter.call(this, parameter);
            };
        "#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::UserAgentManager;

    #[test]
    fn maximum_level_disables_gpu() {
        let mut manager = UserAgentManager::new();
        let profile = manager.session_profile().clone();
        let args = build_stealth_arguments(&StealthLevel::Maximum, &profile);
        assert!(args.iter().any(|a| a == "--disable-gpu"));
        let args = build_stealth_arguments(&StealthLevel::Balanced, &profile);
        assert!(!args.iter().any(|a| a == "--disable-gpu"));
    }

    #[test]
    fn arguments_carry_fingerprint() {
        let mut manager = UserAgentManager::new();
        let profile = manager.session_profile().clone();
        let args = build_stealth_arguments(&StealthLevel::Lightweight, &profile);
        assert!(args
            .iter()
            .any(|a| a.starts_with("--user-agent=Mozilla/5.0")));
        assert!(args.iter().any(|a| a.starts_with("--window-size=")));
    }
}
